use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;

use super::common::{Backend, BackendResult, DeleteOutcome, GetResponse, ObjectLocation};
use crate::metadata::Metadata;
use crate::name::ObjectName;

/// Stores objects as files in a single flat directory.
#[derive(Debug)]
pub struct LocalFs {
    path: PathBuf,
}

impl LocalFs {
    /// Opens the storage directory, creating it if it does not exist.
    pub async fn new(path: &Path) -> BackendResult<Self> {
        tokio::fs::create_dir_all(path).await?;
        Ok(Self { path: path.into() })
    }

    fn object_path(&self, name: &ObjectName) -> PathBuf {
        self.path.join(name.as_str())
    }
}

#[async_trait::async_trait]
impl Backend for LocalFs {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    #[tracing::instrument(level = "trace", fields(%name), skip_all)]
    async fn put_object(
        &self,
        name: &ObjectName,
        _metadata: &Metadata,
        contents: Bytes,
    ) -> BackendResult<ObjectLocation> {
        tracing::debug!("Writing to local_fs backend");
        let path = self.object_path(name);

        // Write to a hidden sibling first, so readers never observe a partially written file.
        // The temp path is removed when dropped, which also covers writes that are cancelled.
        let temp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(&self.path)?;
        let (file, temp_path) = temp.into_parts();

        let mut writer = BufWriter::new(File::from_std(file));
        writer.write_all(&contents).await?;
        writer.flush().await?;
        writer.get_ref().sync_data().await?;

        temp_path.persist(&path).map_err(std::io::Error::from)?;

        Ok(ObjectLocation::Path(path))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn list_objects(&self) -> BackendResult<Vec<String>> {
        tracing::debug!("Listing local_fs backend");
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                tracing::debug!(file_name = ?entry.file_name(), "Skipping non UTF-8 file");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    #[tracing::instrument(level = "trace", fields(%name), skip_all)]
    async fn get_object(&self, name: &ObjectName) -> BackendResult<GetResponse> {
        tracing::debug!("Reading from local_fs backend");
        let path = self.object_path(name);
        let file = match OpenOptions::new().read(true).open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("Object not found");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let stream = ReaderStream::new(file);
        Ok(Some((Metadata::default(), stream.boxed())))
    }

    #[tracing::instrument(level = "trace", fields(%name), skip_all)]
    async fn delete_object(&self, name: &ObjectName) -> BackendResult<DeleteOutcome> {
        tracing::debug!("Deleting from local_fs backend");
        let path = self.object_path(name);
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    async fn object_url(&self, _name: &ObjectName) -> BackendResult<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::BytesMut;
    use futures_util::TryStreamExt;

    use super::*;

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("nested/uploads");

        LocalFs::new(&path).await.unwrap();
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn stores_and_reads_files() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(tempdir.path()).await.unwrap();

        let location = backend
            .put_object(&name("notes.txt"), &Metadata::default(), "hello".into())
            .await
            .unwrap();
        assert_eq!(
            location,
            ObjectLocation::Path(tempdir.path().join("notes.txt"))
        );

        let (_metadata, stream) = backend.get_object(&name("notes.txt")).await.unwrap().unwrap();
        let contents: BytesMut = stream.try_collect().await.unwrap();
        assert_eq!(contents.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn overwrites_existing_files() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(tempdir.path()).await.unwrap();

        for contents in ["first", "second"] {
            backend
                .put_object(&name("a.txt"), &Metadata::default(), contents.into())
                .await
                .unwrap();
        }

        let contents = std::fs::read(tempdir.path().join("a.txt")).unwrap();
        assert_eq!(contents, b"second");
        assert_eq!(backend.list_objects().await.unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn lists_only_regular_visible_files() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(tempdir.path()).await.unwrap();

        std::fs::write(tempdir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(tempdir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(tempdir.path().join(".a.txt.123.tmp"), b"partial").unwrap();
        std::fs::create_dir(tempdir.path().join("subdir")).unwrap();

        let names = backend.list_objects().await.unwrap();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn cancelled_writes_leave_no_temp_files() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(tempdir.path()).await.unwrap();
        let contents = Bytes::from(vec![b'x'; 8 * 1024 * 1024]);

        for _ in 0..10 {
            let object_name = name("big.bin");
            let metadata = Metadata::default();
            let put = backend.put_object(&object_name, &metadata, contents.clone());
            tokio::time::timeout(Duration::from_millis(1), put).await.ok();
        }

        for entry in std::fs::read_dir(tempdir.path()).unwrap() {
            let file_name = entry.unwrap().file_name();
            assert_eq!(file_name, "big.bin", "leftover file {file_name:?}");
        }
    }

    #[tokio::test]
    async fn writes_leave_no_temp_files() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(tempdir.path()).await.unwrap();

        backend
            .put_object(&name("a.txt"), &Metadata::default(), "a".into())
            .await
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(tempdir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn missing_objects() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(tempdir.path()).await.unwrap();

        assert!(backend.get_object(&name("nope")).await.unwrap().is_none());
        assert_eq!(
            backend.delete_object(&name("nope")).await.unwrap(),
            DeleteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn deletes_files() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(tempdir.path()).await.unwrap();

        backend
            .put_object(&name("gone.txt"), &Metadata::default(), "x".into())
            .await
            .unwrap();

        assert_eq!(
            backend.delete_object(&name("gone.txt")).await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert!(backend.list_objects().await.unwrap().is_empty());
    }
}
