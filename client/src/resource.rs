use core::fmt;
use url::Url;

const API: &str = "api";
const PHOTOS: &str = "photos";
const BLOBS: &str = "blobs";

/// Address of an Intellipix server and the endpoints it exposes.
#[derive(Clone)]
pub struct Resource {
    url: Url,
}

impl Resource {
    #[must_use]
    pub fn new(uri: &str) -> Option<Resource> {
        let base = Url::parse(uri).ok()?;
        if base.cannot_be_a_base() {
            return None;
        }
        Some(Resource { url: base })
    }

    /// Appends segments to the path. Each segment is percent-encoded so
    /// file names with spaces or slashes stay a single segment.
    pub fn append_segments(&mut self, segments: &[&str]) -> &mut Self {
        if let Ok(mut path) = self.url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        self
    }

    #[must_use]
    pub fn photos(&self) -> Resource {
        let mut r = self.clone();
        r.append_segments(&[API, PHOTOS]);
        r
    }

    #[must_use]
    pub fn photo(&self, name: &str) -> Resource {
        let mut r = self.clone();
        r.append_segments(&[API, PHOTOS, name]);
        r
    }

    #[must_use]
    pub fn blob(&self, container: &str, name: &str) -> Resource {
        let mut r = self.clone();
        r.append_segments(&[BLOBS, container, name]);
        r
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
