use std::fmt::{Debug, Display};

use kernel::{BlobInfo, Metadata};

/// Named binary objects grouped into containers, each object carrying a
/// string-to-string metadata mapping.
pub trait BlobStore {
    type Err: Debug + Display;

    fn new_database(&self) -> Result<(), Self::Err>;

    /// Creates or overwrites an object. Overwriting clears its metadata.
    fn upload_blob(
        &mut self,
        container: &str,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<BlobInfo, Self::Err>;

    fn list_blobs(&mut self, container: &str) -> Result<Vec<BlobInfo>, Self::Err>;

    fn get_blob_info(&mut self, container: &str, name: &str) -> Result<BlobInfo, Self::Err>;

    fn get_blob_data(&self, container: &str, name: &str) -> Result<Vec<u8>, Self::Err>;

    fn get_metadata(&mut self, container: &str, name: &str) -> Result<Metadata, Self::Err>;

    /// Replaces the whole metadata mapping of an existing object.
    fn set_metadata(
        &mut self,
        container: &str,
        name: &str,
        metadata: &Metadata,
    ) -> Result<(), Self::Err>;
}
