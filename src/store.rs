//! Remote object-storage abstraction used to locate, fetch, and remove
//! exported artifacts.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;

/// Opaque identifier for a stored object.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ObjectId(pub String);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One object visible in a storage listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteObject {
    /// Storage-assigned identifier.
    pub id: ObjectId,
    /// Object name; artifacts follow the naming convention.
    pub name: String,
    /// Advertised byte size, when the store reports one. Used to verify
    /// downloads before the remote copy is deleted.
    pub size: Option<u64>,
}

/// Listing filter. Both fields are conjunctive when present.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ObjectQuery {
    /// Restrict to objects of this MIME type.
    pub mime_type: Option<String>,
    /// Restrict to objects whose MIME type differs from this one.
    pub mime_type_not: Option<String>,
    /// Restrict to names containing this substring.
    pub name_contains: Option<String>,
}

impl ObjectQuery {
    /// Query for raster artifacts (GeoTIFF objects).
    #[must_use]
    pub fn rasters() -> Self {
        Self {
            mime_type: Some(String::from("image/tiff")),
            mime_type_not: None,
            name_contains: None,
        }
    }

    /// Query for non-raster artifacts whose name contains `fragment`.
    #[must_use]
    pub fn tables(fragment: impl Into<String>) -> Self {
        Self {
            mime_type: None,
            mime_type_not: Some(String::from("image/tiff")),
            name_contains: Some(fragment.into()),
        }
    }
}

/// Future returned by store operations.
pub type StoreFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by remote object stores.
pub trait RemoteStore {
    /// Store specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists objects matching `query`.
    fn list<'a>(
        &'a self,
        query: &'a ObjectQuery,
    ) -> StoreFuture<'a, Vec<RemoteObject>, Self::Error>;

    /// Streams `object` into `dest`, returning the byte count written.
    /// Must not remove the remote copy.
    fn download<'a>(
        &'a self,
        object: &'a RemoteObject,
        dest: &'a Utf8Path,
    ) -> StoreFuture<'a, u64, Self::Error>;

    /// Removes `id` from the store. Irreversible; callers must verify the
    /// local copy first.
    fn delete<'a>(&'a self, id: &'a ObjectId) -> StoreFuture<'a, (), Self::Error>;
}
