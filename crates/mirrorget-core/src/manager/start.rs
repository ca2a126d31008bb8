//! Start-up sequence of a session: destination file, probe, preallocation.

use std::path::Path;

use crate::events::TaskResult;
use crate::probe::RemoteFileInfo;
use crate::storage::{StorageWriter, StorageWriterBuilder};
use crate::url_model::{destination_path, mirror_url};

/// Everything a session needs once the probe has answered.
pub(crate) struct Prepared {
    pub(crate) storage: StorageWriter,
    pub(crate) info: RemoteFileInfo,
    /// Servers whose probe failed before one answered.
    pub(crate) unusable: Vec<String>,
}

/// Create the destination file and probe `servers` in order until one answers.
///
/// Errors carry the terminal result to report; nothing is left on disk when
/// preparation fails after the file was created.
pub(crate) fn prepare<P>(
    servers: &[String],
    folder: &Path,
    relative_path: &str,
    mut prober: P,
) -> Result<Prepared, TaskResult>
where
    P: FnMut(&str) -> RemoteFileInfo,
{
    if servers.is_empty() {
        tracing::warn!("no servers configured; not starting {}", relative_path);
        return Err(TaskResult::FailNoViableServer);
    }

    let path = destination_path(folder, relative_path);
    let mut builder = StorageWriterBuilder::create(&path).map_err(|e| {
        tracing::error!("cannot create {}: {:#}", path.display(), e);
        TaskResult::FailCannotCreateFile
    })?;

    let mut unusable = Vec::new();
    let mut answer = None;
    for server in servers {
        let info = match mirror_url(server, relative_path) {
            Ok(url) => prober(&url),
            Err(e) => {
                tracing::warn!(server = %server, "bad mirror address: {:#}", e);
                RemoteFileInfo::unreachable()
            }
        };
        if info.is_viable() {
            tracing::debug!(
                server = %server,
                size = ?info.size,
                partial = info.supports_partial_download,
                hash = %info.content_hash_hex(),
                "probe answered"
            );
            answer = Some(info);
            break;
        }
        tracing::warn!(server = %server, "probe failed");
        unusable.push(server.clone());
    }

    let Some(info) = answer else {
        builder.discard();
        return Err(TaskResult::FailNoViableServer);
    };

    if let Err(e) = builder.preallocate(info.size.unwrap_or(0)) {
        tracing::error!("cannot preallocate {}: {:#}", path.display(), e);
        builder.discard();
        return Err(TaskResult::FailCannotCreateFile);
    }

    Ok(Prepared {
        storage: builder.build(),
        info,
        unusable,
    })
}
