use url::Url;

const BLOBS_SEGMENT: &str = "blobs";

/// Builds the externally reachable location of stored objects:
/// `<public base>/blobs/<container>/<name>`.
#[derive(Debug, Clone)]
pub struct BlobLocator {
    base: Url,
}

impl BlobLocator {
    /// `None` when `public_url` is not an absolute http(s)-like base.
    #[must_use]
    pub fn new(public_url: &str) -> Option<Self> {
        let base = Url::parse(public_url).ok()?;
        if base.cannot_be_a_base() {
            return None;
        }
        Some(Self { base })
    }

    #[must_use]
    pub fn blob_uri(&self, container: &str, name: &str) -> String {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([BLOBS_SEGMENT, container, name]);
        }
        url.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://localhost:5000", "photos", "a.jpg", "http://localhost:5000/blobs/photos/a.jpg")]
    #[case("http://localhost:5000/", "photos", "a.jpg", "http://localhost:5000/blobs/photos/a.jpg")]
    #[case("https://pix.example.com/album", "thumbnails", "a.jpg", "https://pix.example.com/album/blobs/thumbnails/a.jpg")]
    #[case("https://pix.example.com/album/", "photos", "my cat.png", "https://pix.example.com/album/blobs/photos/my%20cat.png")]
    #[case("http://localhost:5000", "photos", "100%#1.png", "http://localhost:5000/blobs/photos/100%25%231.png")]
    #[trace]
    fn blob_uri_cases(
        #[case] base: &str,
        #[case] container: &str,
        #[case] name: &str,
        #[case] expected: &str,
    ) {
        // Arrange
        let locator = BlobLocator::new(base).unwrap();

        // Act
        let uri = locator.blob_uri(container, name);

        // Assert
        assert_eq!(uri, expected);
    }

    #[rstest]
    #[case("localhost:5000/x y")]
    #[case("data:text/plain,hello")]
    #[case("")]
    #[trace]
    fn new_rejects_non_base(#[case] base: &str) {
        // Act
        let locator = BlobLocator::new(base);

        // Assert
        assert!(locator.is_none());
    }
}
