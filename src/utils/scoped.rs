/// Transient files that live only as long as the command that needs them
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::Result;

/// A temporary file removed when dropped, including on early returns through `?`
#[derive(Debug)]
pub struct ScopedFile {
    file: NamedTempFile,
}

impl ScopedFile {
    /// Write `contents` to a new file named `<prefix><random>` in the system temp dir
    pub fn write(prefix: &str, contents: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new().prefix(prefix).tempfile()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(Self { file })
    }

    /// Scoped file holding the kubeconfig of `cluster_name`
    pub fn kubeconfig(cluster_name: &str, kubeconfig: &str) -> Result<Self> {
        Self::write(&format!("kubeconfig-{}-", cluster_name), kubeconfig)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
