//! Filesystem collaborator for the server: authenticates a request against
//! the user table and dispatches to the matching local filesystem
//! operation, producing the response the event loop serializes.
//!
//! Every operation is scoped under `<root>/<username>/`, created on first
//! access. Logical failures travel as `Status` values, never as errors; the
//! event loop treats response building as infallible.

use crate::config::UserTable;
use crate::protocol::{OpKind, Status};
use crate::wire::{Request, RequestOp, Response, ResponseBody};
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Storage { root: root.into() }
    }

    /// Per-user directory, auto-created on first access.
    fn user_dir(&self, username: &str) -> Result<PathBuf> {
        let dir = self.root.join(username);
        if !dir.is_dir() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating user dir {}", dir.display()))?;
        }
        Ok(dir)
    }

    /// Resolve a request path under the user directory. Leading slashes are
    /// stripped; parent-directory components would escape the scope and
    /// resolve to `None`.
    fn resolve(user_dir: &Path, path: &str) -> Option<PathBuf> {
        let mut resolved = user_dir.to_path_buf();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(seg) => resolved.push(seg),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(resolved)
    }

    /// Authenticate and dispatch. The returned response is always well
    /// formed; failures are encoded in its status.
    pub fn build_response(&self, users: &UserTable, req: &Request) -> Response {
        let kind = req.op.kind();
        if !users.is_valid(&req.username, &req.password) {
            debug!(username = %req.username, "rejecting invalid identity");
            return Response::empty(kind, Status::InvalidIdentity);
        }

        let user_dir = match self.user_dir(&req.username) {
            Ok(dir) => dir,
            Err(err) => {
                warn!(username = %req.username, %err, "user dir unavailable");
                return Response::empty(kind, Status::InvalidPath);
            }
        };
        let full = match Self::resolve(&user_dir, req.op.path()) {
            Some(full) => full,
            None => {
                warn!(path = %req.op.path(), "request path escapes user scope");
                return Response::empty(kind, Status::InvalidPath);
            }
        };

        match &req.op {
            RequestOp::Put { file, .. } => self.put(&full, file),
            RequestOp::Get { .. } => self.get(&full),
            RequestOp::List { .. } => self.list(&full),
            RequestOp::Mkdir { .. } => self.mkdir(&full),
        }
    }

    fn put(&self, full: &Path, file: &[u8]) -> Response {
        debug!(path = %full.display(), len = file.len(), "put");
        match std::fs::write(full, file) {
            Ok(()) => Response::empty(OpKind::Put, Status::Success),
            Err(err) => {
                debug!(path = %full.display(), %err, "put failed");
                Response::empty(OpKind::Put, Status::InvalidPath)
            }
        }
    }

    fn get(&self, full: &Path) -> Response {
        debug!(path = %full.display(), "get");
        match std::fs::read(full) {
            Ok(file) => Response {
                kind: OpKind::Get,
                status: Status::Success,
                body: ResponseBody::File(file),
            },
            Err(_) => Response::empty(OpKind::Get, Status::FileNotFound),
        }
    }

    fn list(&self, full: &Path) -> Response {
        debug!(path = %full.display(), "list");
        let entries = match std::fs::read_dir(full) {
            Ok(entries) => entries,
            Err(err) => {
                let status = match err.kind() {
                    ErrorKind::NotFound => Status::FileNotFound,
                    _ => Status::NotDirectory,
                };
                return Response::empty(OpKind::List, status);
            }
        };
        let mut names = Vec::new();
        for entry in entries.flatten() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Response {
            kind: OpKind::List,
            status: Status::Success,
            body: ResponseBody::Listing(names),
        }
    }

    fn mkdir(&self, full: &Path) -> Response {
        debug!(path = %full.display(), "mkdir");
        match std::fs::create_dir(full) {
            Ok(()) => Response::empty(OpKind::Mkdir, Status::Success),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Response::empty(OpKind::Mkdir, Status::PathAlreadyExists)
            }
            Err(_) => Response::empty(OpKind::Mkdir, Status::InvalidPath),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Storage, UserTable) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let users = UserTable::parse("alice secret\n").unwrap();
        (dir, storage, users)
    }

    fn request(op: RequestOp) -> Request {
        Request {
            username: "alice".into(),
            password: "secret".into(),
            op,
        }
    }

    #[test]
    fn rejects_unknown_identity() {
        let (_dir, storage, users) = setup();
        let mut req = request(RequestOp::List { path: ".".into() });
        req.password = "wrong".into();
        let res = storage.build_response(&users, &req);
        assert_eq!(res.status, Status::InvalidIdentity);
    }

    #[test]
    fn put_then_get_round_trips_under_user_scope() {
        let (dir, storage, users) = setup();
        let res = storage.build_response(
            &users,
            &request(RequestOp::Put {
                path: "/.data.bin.0".into(),
                file: vec![1, 2, 3],
            }),
        );
        assert_eq!(res.status, Status::Success);
        assert!(dir.path().join("alice/.data.bin.0").is_file());

        let res = storage.build_response(
            &users,
            &request(RequestOp::Get {
                path: ".data.bin.0".into(),
            }),
        );
        assert_eq!(res.status, Status::Success);
        assert_eq!(res.body, ResponseBody::File(vec![1, 2, 3]));
    }

    #[test]
    fn get_missing_file_is_not_found() {
        let (_dir, storage, users) = setup();
        let res = storage.build_response(
            &users,
            &request(RequestOp::Get {
                path: "nope".into(),
            }),
        );
        assert_eq!(res.status, Status::FileNotFound);
        assert_eq!(res.body, ResponseBody::Empty);
    }

    #[test]
    fn list_statuses() {
        let (_dir, storage, users) = setup();
        storage.build_response(
            &users,
            &request(RequestOp::Put {
                path: "file".into(),
                file: vec![0],
            }),
        );

        let res = storage.build_response(&users, &request(RequestOp::List { path: ".".into() }));
        assert_eq!(res.status, Status::Success);
        assert_eq!(res.body, ResponseBody::Listing(vec!["file".into()]));

        let res = storage.build_response(
            &users,
            &request(RequestOp::List {
                path: "file".into(),
            }),
        );
        assert_eq!(res.status, Status::NotDirectory);

        let res = storage.build_response(
            &users,
            &request(RequestOp::List {
                path: "missing".into(),
            }),
        );
        assert_eq!(res.status, Status::FileNotFound);
    }

    #[test]
    fn mkdir_reports_existing_path() {
        let (_dir, storage, users) = setup();
        let req = request(RequestOp::Mkdir {
            path: "docs".into(),
        });
        assert_eq!(storage.build_response(&users, &req).status, Status::Success);
        assert_eq!(
            storage.build_response(&users, &req).status,
            Status::PathAlreadyExists
        );
    }

    #[test]
    fn parent_traversal_is_invalid_path() {
        let (_dir, storage, users) = setup();
        let res = storage.build_response(
            &users,
            &request(RequestOp::Get {
                path: "../other/file".into(),
            }),
        );
        assert_eq!(res.status, Status::InvalidPath);
    }
}
