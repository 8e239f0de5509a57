use std::time::Duration;

use {
    async_trait::async_trait,
    jsaddons_config::RegistryConfig,
    serde_json::Value,
};

use crate::{
    error::{Error, Result, ValidationError},
    types::AddonManifest,
    validate::ManifestValidator,
};

/// Source of addon metadata.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the raw "latest version" document for an already sanitized
    /// identifier. One network round trip, no validation.
    async fn fetch_latest(&self, name: &str) -> Result<Value>;
}

/// Resolve `name` to a validated manifest carrying its archive URL.
pub async fn resolve(
    registry: &dyn RegistryClient,
    validator: &ManifestValidator,
    name: &str,
) -> Result<AddonManifest> {
    let document = registry.fetch_latest(name).await?;
    validator
        .validate_registry_document(&document)
        .map_err(|reason| Error::invalid_addon(name, reason))
}

/// Build the shared HTTP client.
///
/// Only the connect phase and individual reads are bounded here, so archive
/// downloads of any allowed size succeed as long as bytes keep arriving. The
/// overall limit for registry lookups is applied per request by
/// [`HttpRegistryClient`].
pub fn http_client(config: &RegistryConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout())
        .read_timeout(config.read_timeout())
        .build()
        .map_err(|e| Error::Message(format!("failed to build HTTP client: {e}")))
}

/// Map a reqwest transport failure onto the resolution error taxonomy.
///
/// Everything that is not a timeout (DNS, refused connections, resets, broken
/// bodies, redirect loops) is reported as `NetworkUnavailable` so it stays
/// retryable.
pub(crate) fn transport_error(what: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("{what}: {err}"))
    } else {
        Error::NetworkUnavailable(format!("{what}: {err}"))
    }
}

/// npm-style registry reached over HTTP.
pub struct HttpRegistryClient {
    client: reqwest::Client,
    url_template: String,
    request_timeout: Option<Duration>,
}

impl HttpRegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        Ok(
            Self::with_client(http_client(config)?, config.url_template.clone())
                .with_request_timeout(config.request_timeout()),
        )
    }

    pub fn with_client(client: reqwest::Client, url_template: impl Into<String>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            request_timeout: None,
        }
    }

    /// Bound each lookup as a whole, body included.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Substitute the identifier into the `{name}` placeholder.
    pub fn latest_url(&self, name: &str) -> String {
        self.url_template
            .replace("{name}", &urlencoding::encode(name))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn fetch_latest(&self, name: &str) -> Result<Value> {
        let url = self.latest_url(name);
        tracing::info!(%name, %url, "looking up addon in registry");

        let mut request = self.client.get(&url);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&format!("registry lookup for '{name}'"), &e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%name, status = status.as_u16(), "registry lookup failed");
            return Err(Error::RegistryLookupFailed {
                name: name.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&format!("reading registry response for '{name}'"), &e))?;

        serde_json::from_slice(&body).map_err(|e| {
            Error::invalid_addon(name, ValidationError::MalformedManifest(e.to_string()))
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use {super::*, serde_json::json};

    /// Accepts connections and never answers. Returns the base URL.
    pub(crate) async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        format!("http://{addr}")
    }

    fn latest_doc(tarball: Option<&str>) -> Value {
        let mut doc = json!({
            "name": "ankidroid-js-addon-progress-bar",
            "version": "1.0.0",
            "author": "x",
            "homepage": "https://example.com",
            "ankidroid_js_api": "0.0.1",
            "addon_type": "reviewer",
            "keywords": ["ankidroid-js-addon"],
        });
        if let Some(tarball) = tarball {
            doc["dist"] = json!({ "tarball": tarball });
        }
        doc
    }

    fn client_for(server: &mockito::Server) -> HttpRegistryClient {
        HttpRegistryClient::with_client(
            reqwest::Client::new(),
            format!("{}/{{name}}/latest", server.url()),
        )
    }

    #[test]
    fn latest_url_substitutes_name() {
        let client = HttpRegistryClient::with_client(
            reqwest::Client::new(),
            "https://r.example/{name}/latest",
        );
        assert_eq!(
            client.latest_url("ankidroid-js-addon-timer"),
            "https://r.example/ankidroid-js-addon-timer/latest"
        );
    }

    #[tokio::test]
    async fn resolve_returns_manifest_with_archive_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ankidroid-js-addon-progress-bar/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(latest_doc(Some("https://example.com/p.tgz")).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let manifest = resolve(
            &client,
            &ManifestValidator::default(),
            "ankidroid-js-addon-progress-bar",
        )
        .await
        .unwrap();

        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(
            manifest.dist_archive_url.as_deref(),
            Some("https://example.com/p.tgz")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_found_is_lookup_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing-addon/latest")
            .with_status(404)
            .with_body("Not Found")
            .create_async()
            .await;

        let err = client_for(&server)
            .fetch_latest("missing-addon")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RegistryLookupFailed { ref name, status: 404 } if name == "missing-addon"
        ));
    }

    #[tokio::test]
    async fn missing_tarball_is_invalid_addon() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/foo/latest")
            .with_status(200)
            .with_body(latest_doc(None).to_string())
            .create_async()
            .await;

        let err = resolve(&client_for(&server), &ManifestValidator::default(), "foo")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidAddon {
                reason: ValidationError::MissingArchiveUrl,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn non_addon_package_is_invalid_addon() {
        let mut server = mockito::Server::new_async().await;
        let mut doc = latest_doc(Some("https://example.com/p.tgz"));
        doc["keywords"] = json!(["react"]);
        let _mock = server
            .mock("GET", "/left-pad/latest")
            .with_status(200)
            .with_body(doc.to_string())
            .create_async()
            .await;

        let err = resolve(&client_for(&server), &ManifestValidator::default(), "left-pad")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidAddon {
                reason: ValidationError::NotAnAddonPackage(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn garbage_body_is_malformed_manifest() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/foo/latest")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = client_for(&server).fetch_latest("foo").await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidAddon {
                reason: ValidationError::MalformedManifest(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_network_unavailable() {
        // Bind then drop a listener so the port is known to be closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = HttpRegistryClient::with_client(
            reqwest::Client::new(),
            format!("http://127.0.0.1:{port}/{{name}}/latest"),
        );

        let err = client.fetch_latest("foo").await.unwrap_err();
        assert!(matches!(err, Error::NetworkUnavailable(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unanswered_lookup_is_timeout() {
        let base = silent_server().await;
        let client = HttpRegistryClient::with_client(
            reqwest::Client::new(),
            format!("{base}/{{name}}/latest"),
        )
        .with_request_timeout(Duration::from_millis(200));

        let err = client.fetch_latest("foo").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn stalled_read_is_timeout() {
        let base = silent_server().await;
        let client = reqwest::Client::builder()
            .read_timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let client = HttpRegistryClient::with_client(client, format!("{base}/{{name}}/latest"));

        let err = client.fetch_latest("foo").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "{err:?}");
    }

    #[tokio::test]
    async fn redirect_loop_is_network_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/foo/latest")
            .with_status(302)
            .with_header("location", "/foo/latest")
            .create_async()
            .await;

        let err = client_for(&server).fetch_latest("foo").await.unwrap_err();
        assert!(matches!(err, Error::NetworkUnavailable(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(http_client(&RegistryConfig::default()).is_ok());
        assert!(HttpRegistryClient::new(&RegistryConfig::default()).is_ok());
    }
}
