use kernel::{tags_from_metadata, DisplayRecord, CAPTION_KEY, PHOTOS, THUMBNAILS};

use crate::domain::BlobStore;
use crate::locator::BlobLocator;

/// Derives a thumbnail location from an original's location by swapping the
/// container segment. The thumbnail is not checked for existence.
pub fn thumbnail_uri(image_uri: &str) -> String {
    image_uri.replace(&format!("/{PHOTOS}/"), &format!("/{THUMBNAILS}/"))
}

/// One display record per stored original, in the store's listing order.
pub fn build_gallery<S: BlobStore>(
    store: &mut S,
    locator: &BlobLocator,
) -> Result<Vec<DisplayRecord>, S::Err> {
    let blobs = store.list_blobs(PHOTOS)?;
    let mut records = Vec::with_capacity(blobs.len());
    for blob in blobs {
        let metadata = store.get_metadata(PHOTOS, &blob.name)?;
        let image_uri = locator.blob_uri(PHOTOS, &blob.name);
        records.push(DisplayRecord {
            thumbnail_uri: thumbnail_uri(&image_uri),
            image_uri,
            tags: tags_from_metadata(&metadata),
            caption: metadata
                .get(CAPTION_KEY)
                .cloned()
                .unwrap_or(blob.name),
        });
    }
    Ok(records)
}
