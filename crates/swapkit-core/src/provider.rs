use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Deserializer};

use crate::http::{HttpResponse, HttpTransport, TransportError};
use crate::progress::ProgressCallback;
use crate::version::{Version, VersionError};

/// Deserialize an explicit JSON `null` the same way as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Anything published under a version tag.
pub trait Tagged {
    fn tag_name(&self) -> &str;

    /// # Errors
    /// Returns [`VersionError`] when the tag is not a version.
    fn version(&self) -> Result<Version, VersionError> {
        Version::parse(self.tag_name())
    }
}

/// A release-hosting API that can list releases and download their assets.
#[async_trait]
pub trait ReleaseProvider: Send {
    type Release: Tagged + Send;
    type Error: std::error::Error + From<VersionError> + Send;

    /// Fetch the raw listing, in the order the server returned it.
    async fn list_releases(&mut self) -> Result<Vec<Self::Release>, Self::Error>;

    /// Download `url` (absolute or relative to the base URL) into a fresh
    /// temporary file and return its path. The caller owns the file.
    async fn download_to_temp_file(
        &self,
        url: &str,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<PathBuf, Self::Error>;

    /// List releases, keep the ones `is_new` accepts and, when a key is given,
    /// order them by that key, greatest first.
    async fn fetch_new_releases<P, F, K>(
        &mut self,
        is_new: P,
        order_by_descending: Option<F>,
    ) -> Result<Vec<Self::Release>, Self::Error>
    where
        P: Fn(&Self::Release) -> bool + Send,
        F: Fn(&Self::Release) -> K + Send,
        K: Ord,
    {
        let releases = self.list_releases().await?;
        Ok(select_new_releases(releases, is_new, order_by_descending))
    }

    /// Releases whose tag is a greater version than `local`, newest first.
    ///
    /// # Errors
    /// A tag that is not a version fails the whole call with the provider's
    /// invalid-version error.
    async fn fetch_new_releases_since(
        &mut self,
        local: &Version,
    ) -> Result<Vec<Self::Release>, Self::Error> {
        let releases = self.list_releases().await?;

        let mut versioned = Vec::with_capacity(releases.len());
        for release in releases {
            let version = release.version()?;
            if version > *local {
                versioned.push((version, release));
            }
        }
        versioned.sort_by(|(a, _), (b, _)| b.cmp(a));

        debug!("{} release(s) newer than {local}", versioned.len());
        Ok(versioned.into_iter().map(|(_, release)| release).collect())
    }
}

/// Filter `releases` with `is_new` and stable-sort the survivors descending by
/// `order_by_descending`.
pub fn select_new_releases<R, P, F, K>(
    releases: Vec<R>,
    is_new: P,
    order_by_descending: Option<F>,
) -> Vec<R>
where
    P: Fn(&R) -> bool,
    F: Fn(&R) -> K,
    K: Ord,
{
    let mut kept: Vec<R> = releases.into_iter().filter(|release| is_new(release)).collect();
    if let Some(key) = order_by_descending {
        kept.sort_by(|a, b| key(b).cmp(&key(a)));
    }
    kept
}

/// Download into a fresh temporary file. On failure the response is handed
/// back so the provider can wrap it in its own error type.
pub(crate) async fn download_to_temp(
    transport: &HttpTransport,
    url: &str,
    on_progress: Option<ProgressCallback<'_>>,
) -> Result<PathBuf, HttpResponse> {
    let path = tempfile::Builder::new()
        .prefix("swapkit-download-")
        .tempfile()
        .and_then(|file| file.into_temp_path().keep().map_err(|error| error.error))
        .map_err(|error| {
            HttpResponse::finish(
                None,
                Err(TransportError::io(
                    "failed to create temporary file",
                    &std::env::temp_dir(),
                    error,
                )),
                None,
            )
        })?;

    let response = transport.download_to_file(url, &path, on_progress).await;
    if response.is_success() {
        Ok(path)
    } else {
        Err(response)
    }
}

#[cfg(test)]
mod tests {
    use super::{Tagged, select_new_releases};
    use crate::Version;

    struct Tag(&'static str);

    impl Tagged for Tag {
        fn tag_name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn without_order_the_listing_order_is_kept() {
        let tags = vec![Tag("v1"), Tag("v3"), Tag("v2")];
        let kept = select_new_releases(tags, |t| t.0 != "v3", None::<fn(&Tag) -> u8>);
        let names: Vec<_> = kept.iter().map(|t| t.0).collect();
        assert_eq!(names, ["v1", "v2"]);
    }

    #[test]
    fn ordering_is_descending_and_stable() {
        let tags = vec![Tag("v1.0"), Tag("v2"), Tag("1.0.0.0"), Tag("v1.5")];
        let kept = select_new_releases(
            tags,
            |_| true,
            Some(|t: &Tag| t.version().expect("tag should parse")),
        );
        let names: Vec<_> = kept.iter().map(|t| t.0).collect();
        assert_eq!(names, ["v2", "v1.5", "v1.0", "1.0.0.0"]);
    }

    #[test]
    fn tagged_version_parses_the_tag() {
        assert_eq!(
            Tag("v2.1-beta").version().expect("tag should parse"),
            Version::new(2, 1, 0, 0)
        );
        assert!(Tag("latest").version().is_err());
    }
}
