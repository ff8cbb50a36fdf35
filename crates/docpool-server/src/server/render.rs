//! Filesystem-backed [`Renderer`] used by the server binary.
//!
//! Each document is written to `<output_dir>/<document_id>.txt`. The content
//! goes to a temporary sibling first and is renamed into place, so readers
//! never observe a partially written document.

use docpool::{DocumentId, RenderContext, RenderError, Renderer};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

#[derive(Debug, Clone)]
pub struct FsRenderer {
    output_dir: Arc<Path>,
}

impl FsRenderer {
    /// Creates the renderer, creating `output_dir` if it does not exist.
    pub async fn new(output_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let output_dir = output_dir.into();
        tokio::fs::create_dir_all(&output_dir).await?;
        Ok(Self {
            output_dir: output_dir.into(),
        })
    }

    /// Resolves the file a document is persisted to.
    ///
    /// Ids that could escape `output_dir` are rejected.
    pub fn document_path(&self, document_id: &DocumentId) -> Result<PathBuf, RenderError> {
        let id = document_id.as_str();
        if id.is_empty() || id.contains(['/', '\\', '\0']) || id.contains("..") {
            return Err(RenderError::failed(format!("invalid document id `{id}`")));
        }
        Ok(self.output_dir.join(format!("{id}.txt")))
    }
}

fn document_body(ctx: &RenderContext, document_id: &DocumentId) -> String {
    let generated_at_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!(
        "document: {document_id}\njob: {}\nsubmitter: {}\ngenerated_at_ms: {generated_at_ms}\n",
        ctx.job_id(),
        ctx.submitter(),
    )
}

async fn persist(path: &Path, body: String) -> io::Result<()> {
    let staging = path.with_extension("txt.tmp");
    tokio::fs::write(&staging, body).await?;
    tokio::fs::rename(&staging, path).await
}

impl Renderer for FsRenderer {
    fn render(
        &self,
        ctx: RenderContext,
        document_id: DocumentId,
    ) -> impl Future<Output = Result<(), RenderError>> + Send {
        let path = self.document_path(&document_id);
        async move {
            let path = path?;
            let body = document_body(&ctx, &document_id);

            tokio::select! {
                biased;
                () = ctx.cancelled() => Err(RenderError::Cancelled),
                written = persist(&path, body) => written.map_err(|e| {
                    RenderError::failed(format!("failed to write {}: {e}", path.display()))
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpool::JobId;
    use std::time::Duration;

    fn ctx() -> RenderContext {
        RenderContext::new(JobId::new(7), "alice", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn writes_document_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let renderer = FsRenderer::new(&out).await.unwrap();

        renderer.render(ctx(), "invoice-1".into()).await.unwrap();

        let written = tokio::fs::read_to_string(out.join("invoice-1.txt"))
            .await
            .unwrap();
        assert!(written.starts_with("document: invoice-1\n"));
        assert!(written.contains("job: job-7\n"));
        assert!(written.contains("submitter: alice\n"));
        assert!(
            !out.join("invoice-1.txt.tmp").exists(),
            "staging file left behind"
        );
    }

    #[tokio::test]
    async fn rejects_ids_escaping_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FsRenderer::new(dir.path()).await.unwrap();

        for id in ["", "../escape", "a/b", "a\\b", "..", "x..y"] {
            let err = renderer.render(ctx(), id.into()).await.unwrap_err();
            assert!(
                matches!(err, RenderError::Failed { .. }),
                "`{id}` was not rejected"
            );
        }
    }

    #[tokio::test]
    async fn cancelled_context_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FsRenderer::new(dir.path()).await.unwrap();

        let ctx = ctx();
        ctx.cancel();
        let err = renderer.render(ctx, "late".into()).await.unwrap_err();

        assert_eq!(err, RenderError::Cancelled);
        assert!(!dir.path().join("late.txt").exists());
    }
}
