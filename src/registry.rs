//! In-memory registry of compilation artifacts.
//!
//! The registry is the single point of mutation for artifact state.
//! One `RwLock` guards the map; critical sections only clone or update
//! an entry in place, so readers never observe a half-written record.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::RwLock;

/// Compilation state of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// Source persisted, toolchain not finished yet.
    Pending,
    /// Binary produced and runnable.
    Compiled,
    /// Toolchain rejected the source.
    Failed,
}

/// One compiled (or compiling, or rejected) submission.
#[derive(Debug, Clone)]
pub struct CompilationArtifact {
    pub id: String,
    pub source_path: PathBuf,
    pub binary_path: PathBuf,
    pub status: ArtifactStatus,
    pub created_at: Instant,
}

/// Owned store mapping identifiers to compilation artifacts.
#[derive(Default)]
pub struct ArtifactRegistry {
    artifacts: RwLock<HashMap<String, CompilationArtifact>>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, artifact: CompilationArtifact) {
        let mut artifacts = self.artifacts.write().await;
        artifacts.insert(artifact.id.clone(), artifact);
    }

    pub async fn get(&self, id: &str) -> Option<CompilationArtifact> {
        self.artifacts.read().await.get(id).cloned()
    }

    /// Artifact gate shared by the execution pipeline and debug start:
    /// present only when the binary is actually runnable.
    pub async fn get_compiled(&self, id: &str) -> Option<CompilationArtifact> {
        self.artifacts
            .read()
            .await
            .get(id)
            .filter(|a| a.status == ArtifactStatus::Compiled)
            .cloned()
    }

    /// Update the status of an existing artifact. Only the compile step
    /// calls this.
    pub async fn set_status(&self, id: &str, status: ArtifactStatus) {
        if let Some(artifact) = self.artifacts.write().await.get_mut(id) {
            artifact.status = status;
        }
    }

    pub async fn remove(&self, id: &str) -> Option<CompilationArtifact> {
        self.artifacts.write().await.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(id: &str, status: ArtifactStatus) -> CompilationArtifact {
        CompilationArtifact {
            id: id.to_string(),
            source_path: PathBuf::from(format!("/tmp/{id}.src")),
            binary_path: PathBuf::from(format!("/tmp/{id}.bin")),
            status,
            created_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn insert_get_remove() {
        let registry = ArtifactRegistry::new();
        registry.insert(artifact("a", ArtifactStatus::Pending)).await;

        assert_eq!(
            registry.get("a").await.unwrap().status,
            ArtifactStatus::Pending
        );
        assert!(registry.get("b").await.is_none());

        registry.remove("a").await.unwrap();
        assert!(registry.get("a").await.is_none());
    }

    #[tokio::test]
    async fn status_transitions() {
        let registry = ArtifactRegistry::new();
        registry.insert(artifact("a", ArtifactStatus::Pending)).await;

        registry.set_status("a", ArtifactStatus::Compiled).await;
        assert_eq!(
            registry.get("a").await.unwrap().status,
            ArtifactStatus::Compiled
        );

        // Updating an unknown id is a no-op
        registry.set_status("nope", ArtifactStatus::Failed).await;
        assert!(registry.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn compiled_gate() {
        let registry = ArtifactRegistry::new();
        registry.insert(artifact("p", ArtifactStatus::Pending)).await;
        registry.insert(artifact("f", ArtifactStatus::Failed)).await;
        registry
            .insert(artifact("c", ArtifactStatus::Compiled))
            .await;

        assert!(registry.get_compiled("p").await.is_none());
        assert!(registry.get_compiled("f").await.is_none());
        assert!(registry.get_compiled("c").await.is_some());
        assert!(registry.get_compiled("missing").await.is_none());
    }
}
