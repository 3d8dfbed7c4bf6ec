use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::ProbeBackend;
use crate::error::Result;
use crate::health::ProbeRow;

/// Reads rows exported by the external browser prober from `<dir>/<host>.json`.
#[derive(Debug, Clone)]
pub struct FileProbeBackend {
    dir: PathBuf,
}

impl FileProbeBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, host: &str) -> PathBuf {
        self.dir.join(format!("{}.json", host))
    }
}

#[async_trait]
impl ProbeBackend for FileProbeBackend {
    async fn probe(&self, host: &str) -> Result<Vec<ProbeRow>> {
        let path = self.path_for(host);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No probe export");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }
}
