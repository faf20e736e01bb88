use async_trait::async_trait;
use atrium_api::agent::atp_agent::store::MemorySessionStore;
use atrium_api::agent::atp_agent::AtpAgent;
use atrium_api::app::bsky::feed::get_posts;
use atrium_api::client::AtpServiceClient;
use atrium_api::com::atproto::identity::resolve_handle;
use atrium_api::com::atproto::repo::get_record;
use atrium_api::types::string::{Did, Handle};
use atrium_api::xrpc::http::{Request, Response};
use atrium_api::xrpc::types::AuthorizationToken;
use atrium_api::xrpc::{HttpClient, XrpcClient as Transport};
use atrium_xrpc_client::reqwest::{ReqwestClient, ReqwestClientBuilder};
use config::Credentials;
use url::Url;

use super::{Pds, RecordOutput, Session, XrpcError};
use crate::lexicon::{BlobRef, Facet, PostView};
use crate::reference::Canonical;
use crate::richtext::native;
use crate::swap::Batch;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A [`Pds`] backed by an `atrium-api` agent, which keeps the session and refreshes it when
/// the access token expires.
pub struct XrpcClient<T = ReqwestClient>
where
    T: Transport + Send + Sync,
{
    agent: AtpAgent<MemorySessionStore, T>,
    transport: T,
}

impl XrpcClient<ReqwestClient> {
    /// A client for the PDS at `service`, e.g. `https://bsky.social`.
    pub fn new(service: &str) -> Result<Self, XrpcError> {
        let service = Url::parse(service)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let transport = ReqwestClientBuilder::new(service.as_str().trim_end_matches('/'))
            .client(http)
            .build();
        Ok(Self::with_transport(transport))
    }
}

impl<T> XrpcClient<T>
where
    T: Transport + Clone + Send + Sync,
{
    pub fn with_transport(transport: T) -> Self {
        XrpcClient {
            agent: AtpAgent::new(transport.clone(), MemorySessionStore::default()),
            transport,
        }
    }

    /// The endpoint requests currently go to. Signing in may move it to the account's own PDS.
    pub async fn service(&self) -> String {
        self.agent.get_endpoint().await
    }
}

/// Sends every request with one fixed access token. A rejected token surfaces as an error
/// rather than being refreshed and the request replayed.
struct SingleShot<T> {
    inner: T,
    base: String,
    token: String,
}

impl<T> HttpClient for SingleShot<T>
where
    T: HttpClient + Send + Sync,
{
    async fn send_http(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, BoxError> {
        self.inner.send_http(request).await
    }
}

impl<T> Transport for SingleShot<T>
where
    T: HttpClient + Send + Sync,
{
    fn base_uri(&self) -> String {
        self.base.clone()
    }

    async fn authorization_token(&self, _is_refresh: bool) -> Option<AuthorizationToken> {
        Some(AuthorizationToken::Bearer(self.token.clone()))
    }
}

#[async_trait]
impl<T> Pds for XrpcClient<T>
where
    T: Transport + Clone + Send + Sync,
{
    #[tracing::instrument(skip_all, fields(identifier = credentials.identifier(), password = "<redacted>"), err)]
    async fn create_session(&self, credentials: &Credentials) -> Result<Session, XrpcError> {
        let session = self
            .agent
            .login(credentials.identifier(), credentials.app_password())
            .await?;
        tracing::info!(
            did = session.did.as_str(),
            handle = session.handle.as_str(),
            "Signed in"
        );
        Ok(Session {
            did: session.data.did,
            handle: session.data.handle,
        })
    }

    #[tracing::instrument(skip(self), fields(handle = handle.as_str()), err)]
    async fn resolve_handle(&self, handle: &Handle) -> Result<Did, XrpcError> {
        let resolved = self
            .agent
            .api
            .com
            .atproto
            .identity
            .resolve_handle(
                resolve_handle::ParametersData {
                    handle: handle.clone(),
                }
                .into(),
            )
            .await?;
        Ok(resolved.data.did)
    }

    #[tracing::instrument(skip(self), fields(%at), err)]
    async fn get_record(&self, at: &Canonical) -> Result<RecordOutput, XrpcError> {
        let params = get_record::ParametersData {
            cid: None,
            collection: at.collection().clone(),
            repo: at.repo().clone().into(),
            rkey: at.rkey().clone(),
        };
        Ok(self
            .agent
            .api
            .com
            .atproto
            .repo
            .get_record(params.into())
            .await?)
    }

    #[tracing::instrument(skip(self), fields(%at), err)]
    async fn get_post_view(&self, at: &Canonical) -> Result<Option<PostView>, XrpcError> {
        let params = get_posts::ParametersData {
            uris: vec![at.to_string()],
        };
        let posts = self.agent.api.app.bsky.feed.get_posts(params.into()).await?;
        Ok(posts.data.posts.into_iter().next())
    }

    /// Goes around the agent, which would replay the batch after refreshing an expired token.
    #[tracing::instrument(skip_all, fields(repo = batch.repo().as_str()), err)]
    async fn apply_writes(&self, batch: &Batch) -> Result<(), XrpcError> {
        let session = self.agent.get_session().await.ok_or(XrpcError::AuthRequired)?;
        let once = AtpServiceClient::new(SingleShot {
            inner: self.transport.clone(),
            base: self.agent.get_endpoint().await,
            token: session.data.access_jwt,
        });
        let applied = once
            .service
            .com
            .atproto
            .repo
            .apply_writes(batch.input())
            .await?;
        tracing::debug!(
            results = applied.results.as_ref().map_or(0, Vec::len),
            "Applied writes"
        );
        Ok(())
    }

    #[tracing::instrument(skip(self, bytes), fields(len = bytes.len()), err)]
    async fn upload_blob(&self, bytes: Vec<u8>, mime: &str) -> Result<BlobRef, XrpcError> {
        let uploaded = self.agent.api.com.atproto.repo.upload_blob(bytes).await?;
        Ok(uploaded.data.blob)
    }

    #[tracing::instrument(skip_all, fields(len = text.len()), err)]
    async fn detect_facets(&self, text: &str) -> Result<Vec<Facet>, XrpcError> {
        native::detect(text, self.transport.clone()).await
    }

    async fn session_did(&self) -> Option<Did> {
        self.agent.get_session().await.map(|s| s.data.did)
    }
}
