use crate::fs::InodeFs;
use crate::fs::errors::{ErrorKind, FsError};
use crate::protocol::{Operation, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// Turns `(token, operation, arguments)` into a response frame. Every
/// failure becomes the `-1` frame; the cause only reaches the logs.
#[derive(Clone)]
pub struct Dispatcher {
    fs: Arc<InodeFs>,
}

impl Dispatcher {
    pub fn new(fs: Arc<InodeFs>) -> Self {
        Self { fs }
    }

    pub async fn handle(
        &self,
        token: Option<&str>,
        op_name: &str,
        args: &HashMap<String, String>,
    ) -> Response {
        let Some(token) = token else {
            debug!("{}: request without tenant token", op_name);
            self.record_failure();
            return Response::error();
        };

        let op = match Operation::parse(op_name, args) {
            Ok(op) => op,
            Err(e) => {
                debug!("{}: rejected arguments: {}", op_name, e);
                self.record_failure();
                return Response::error();
            }
        };

        self.dispatch(token, op).await
    }

    pub async fn dispatch(&self, token: &str, op: Operation) -> Response {
        let name = op.name();
        match self.execute(token, op).await {
            Ok(response) => response,
            Err(e) => {
                match e.kind() {
                    // Lookups of absent names and the end of an iteration are routine
                    ErrorKind::NotFound => debug!("{} for tenant {} failed: {}", name, token, e),
                    kind => warn!(
                        "{} for tenant {} failed ({}): {}",
                        name,
                        token,
                        kind.as_str(),
                        e
                    ),
                }
                self.record_failure();
                Response::error()
            }
        }
    }

    async fn execute(&self, token: &str, op: Operation) -> Result<Response, FsError> {
        let tfs = self.fs.tenant(token).await?;

        let response = match op {
            Operation::Lookup(args) => {
                Response::stat(tfs.lookup(args.parent_id, args.name.as_bytes()).await?)
            }
            Operation::Getattr(args) => Response::stat(tfs.getattr(args.id).await?),
            Operation::Create(args) => Response::stat(
                tfs.create(args.parent_id, args.name.as_bytes(), args.mode)
                    .await?,
            ),
            Operation::Link(args) => {
                tfs.link(args.parent_id, args.name.as_bytes(), args.target_id)
                    .await?;
                Response::status(0)
            }
            Operation::Unlink(args) => {
                tfs.unlink(args.parent_id, args.name.as_bytes()).await?;
                Response::status(0)
            }
            Operation::Rmdir(args) => {
                tfs.rmdir(args.parent_id, args.name.as_bytes()).await?;
                Response::status(0)
            }
            Operation::Read(args) => {
                Response::data(tfs.read(args.id, args.offset, args.size).await?)
            }
            Operation::Write(args) => {
                let written = tfs.write(args.id, args.offset, &args.buf).await?;
                Response::status(written as i64)
            }
            Operation::Iterate(args) => Response::dirent(tfs.iterate(args.id, args.offset).await?),
        };

        Ok(response)
    }

    fn record_failure(&self) {
        self.fs.stats.failed_operations.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::inode::ROOT_ID;
    use crate::protocol::Payload;

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(InodeFs::new_in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn test_missing_token_is_error_frame() {
        let d = dispatcher().await;
        let response = d.handle(None, "getattr", &args(&[("id", "1000")])).await;
        assert_eq!(response, Response::error());
    }

    #[tokio::test]
    async fn test_unknown_operation_is_error_frame() {
        let d = dispatcher().await;
        let response = d.handle(Some("t"), "symlink", &args(&[])).await;
        assert_eq!(response, Response::error());
        assert_eq!(d.fs.stats.failed_operations.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let d = dispatcher().await;
        let token = Some("scenario");

        let created = d
            .handle(
                token,
                "create",
                &args(&[("parent_id", "1000"), ("name", "a.txt"), ("mode", "33188")]),
            )
            .await;
        assert_eq!(created.status, 0);
        match &created.payload {
            Payload::Stat(stat) => {
                assert_eq!(stat.id, ROOT_ID + 1);
                assert_eq!(stat.mode, 0o100644);
                assert_eq!(stat.size, 0);
            }
            other => panic!("Expected stat payload, got {other:?}"),
        }

        let written = d
            .handle(
                token,
                "write",
                &args(&[("id", "1001"), ("offset", "0"), ("buf", "hello")]),
            )
            .await;
        assert_eq!(written.to_bytes().unwrap().as_ref(), &5i64.to_le_bytes());

        let read = d
            .handle(
                token,
                "read",
                &args(&[("id", "1001"), ("offset", "0"), ("size", "5")]),
            )
            .await;
        let frame = read.to_bytes().unwrap();
        assert_eq!(&frame[..8], &5i64.to_le_bytes());
        assert_eq!(&frame[8..], b"hello");

        let past_end = d
            .handle(
                token,
                "read",
                &args(&[("id", "1001"), ("offset", "10"), ("size", "5")]),
            )
            .await;
        assert_eq!(past_end.to_bytes().unwrap().as_ref(), &0i64.to_le_bytes());
    }

    #[tokio::test]
    async fn test_write_near_u64_max_is_error_frame() {
        let d = dispatcher().await;
        let token = Some("t");

        d.handle(
            token,
            "create",
            &args(&[("parent_id", "1000"), ("name", "f"), ("mode", "33188")]),
        )
        .await;

        let response = d
            .handle(
                token,
                "write",
                &args(&[
                    ("id", "1001"),
                    ("offset", "18446744073709551605"),
                    ("buf", "hello"),
                ]),
            )
            .await;
        assert_eq!(response, Response::error());

        let stat = d.handle(token, "getattr", &args(&[("id", "1001")])).await;
        match stat.payload {
            Payload::Stat(stat) => assert_eq!(stat.size, 0),
            other => panic!("Expected stat payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_iterate_end_and_link_to_directory_fail() {
        let d = dispatcher().await;
        let token = Some("t");

        let dot = d
            .handle(token, "iterate", &args(&[("id", "1000"), ("offset", "0")]))
            .await;
        assert_eq!(dot.status, 0);

        let end = d
            .handle(token, "iterate", &args(&[("id", "1000"), ("offset", "2")]))
            .await;
        assert_eq!(end, Response::error());

        let link = d
            .handle(
                token,
                "link",
                &args(&[("parent_id", "1000"), ("name", "x"), ("target_id", "1000")]),
            )
            .await;
        assert_eq!(link, Response::error());
    }
}
