//! Route table: the upload page and the upload endpoint.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::AppError;
use crate::http::{Request, Response};
use crate::router::Router;
use crate::upload::UploadHandler;
use log::{debug, error};

/// Register every route formdrop serves.
pub fn register_routes(router: &mut Router, upload: Arc<UploadHandler>, index_file: Arc<PathBuf>) {
    for path in ["/", "/index.html"] {
        let index_file = Arc::clone(&index_file);
        router.register_exact(
            "GET",
            path,
            Box::new(move |_req: Request| serve_index(&index_file)),
        );
    }

    router.register_exact(
        "POST",
        "/upload",
        Box::new(move |req: Request| upload.handle_upload(req)),
    );
}

fn serve_index(index_file: &Path) -> Result<Response, AppError> {
    match fs::read(index_file) {
        Ok(body) => {
            debug!("Serving {} ({} bytes)", index_file.display(), body.len());
            Ok(Response::html(body))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            error!("Index file {} is missing", index_file.display());
            Err(AppError::NotFound)
        }
        Err(e) => Err(AppError::Io(e)),
    }
}
