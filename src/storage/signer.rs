//! Link signer for the in-memory backend
//!
//! Produces S3-shaped URLs without any credentials so the gateway's link and
//! key-derivation logic behaves identically against local storage.

use std::time::Duration;

use async_trait::async_trait;
use object_store::path::Path as StoragePath;
use object_store::signer::Signer;
use reqwest::{Method, Url};

use super::UrlStyle;

#[derive(Debug, Clone)]
pub struct LocalSigner {
    endpoint: Url,
    bucket: String,
    style: UrlStyle,
}

impl LocalSigner {
    pub fn new(endpoint: Url, bucket: impl Into<String>, style: UrlStyle) -> Self {
        Self {
            endpoint,
            bucket: bucket.into(),
            style,
        }
    }

    fn object_url(&self, path: &StoragePath) -> object_store::Result<Url> {
        let mut url = self.endpoint.clone();

        if self.style == UrlStyle::VirtualHosted {
            let host = url.host_str().unwrap_or("localhost");
            let host = format!("{}.{}", self.bucket, host);
            url.set_host(Some(&host))
                .map_err(|e| generic_error(format!("invalid bucket host {host}: {e}")))?;
        }

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| generic_error(format!("endpoint {} cannot be a base", self.endpoint)))?;
            segments.pop_if_empty();
            if self.style == UrlStyle::PathStyle {
                segments.push(&self.bucket);
            }
            segments.extend(path.parts().map(|part| part.as_ref().to_string()));
        }

        Ok(url)
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn signed_url(
        &self,
        method: Method,
        path: &StoragePath,
        expires_in: Duration,
    ) -> object_store::Result<Url> {
        let mut url = self.object_url(path)?;
        url.query_pairs_mut()
            .append_pair("X-Amz-Method", method.as_str())
            .append_pair("X-Amz-Expires", &expires_in.as_secs().to_string());
        Ok(url)
    }
}

fn generic_error(message: String) -> object_store::Error {
    object_store::Error::Generic {
        store: "LocalSigner",
        source: message.into(),
    }
}
