use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    remote::{
        MatchApi, RemoteResult,
        models::{
            CreatedMatch, MatchLock, MatchPatch, MatchSnapshot, PlayerStats, RecordedThrow,
            ThrowCommand, ThrowMeta, ThrowRecord,
        },
    },
    state::game::MatchSetup,
};

use super::{
    config::ApiConfig,
    error::{HttpApiError, HttpResult},
    models::{
        AcquireLockBody, CreateMatchBody, CreatedMatchData, CreatedMatchMeta, Envelope,
        ErrorBody,
    },
};

const SESSION_HEADER: &str = "x-session-id";

/// [`MatchApi`] implementation over the REST match service.
#[derive(Clone)]
pub struct HttpMatchApi {
    client: Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

impl HttpMatchApi {
    /// Build the HTTP client. No request is issued until the first call.
    pub fn new(config: ApiConfig) -> HttpResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|source| HttpApiError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            token: config.token.map(Arc::from),
        })
    }

    fn request(&self, method: Method, path: &str, session_id: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self
            .client
            .request(method, url)
            .header(SESSION_HEADER, session_id);
        if let Some(ref token) = self.token {
            builder.bearer_auth(token.as_ref())
        } else {
            builder
        }
    }

    async fn send(builder: RequestBuilder, path: &str) -> HttpResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| HttpApiError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::CONFLICT | StatusCode::LOCKED => Err(HttpApiError::Locked {
                path: path.to_string(),
            }),
            status => {
                let body = response.json::<ErrorBody>().await.unwrap_or_default();
                Err(HttpApiError::RequestStatus {
                    path: path.to_string(),
                    status,
                    message: body.into_message(),
                })
            }
        }
    }

    async fn send_json<T, M>(builder: RequestBuilder, path: &str) -> HttpResult<Envelope<T, M>>
    where
        T: DeserializeOwned,
        M: DeserializeOwned,
    {
        let response = Self::send(builder, path).await?;
        response
            .json::<Envelope<T, M>>()
            .await
            .map_err(|source| HttpApiError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }
}

impl MatchApi for HttpMatchApi {
    fn create_match(
        &self,
        setup: MatchSetup,
        match_type_id: u32,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<CreatedMatch>> {
        let api = self.clone();
        Box::pin(async move {
            let path = "matches";
            let builder = api
                .request(Method::POST, path, &session_id)
                .json(&CreateMatchBody::new(&setup, match_type_id));
            let envelope =
                Self::send_json::<CreatedMatchData, CreatedMatchMeta>(builder, path).await?;
            Ok(CreatedMatch {
                match_id: envelope.data.id,
                lock: envelope.meta.and_then(|meta| meta.lock),
            })
        })
    }

    fn acquire_lock(
        &self,
        match_id: String,
        session_id: String,
        forced: bool,
    ) -> BoxFuture<'static, RemoteResult<MatchLock>> {
        let api = self.clone();
        Box::pin(async move {
            let path = format!("matches/{match_id}/lock");
            let builder = api
                .request(Method::POST, &path, &session_id)
                .json(&AcquireLockBody { forced });
            let envelope = Self::send_json::<MatchLock, serde_json::Value>(builder, &path).await?;
            Ok(envelope.data)
        })
    }

    fn release_lock(
        &self,
        match_id: String,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<()>> {
        let api = self.clone();
        Box::pin(async move {
            let path = format!("matches/{match_id}/lock");
            let builder = api.request(Method::DELETE, &path, &session_id);
            Self::send(builder, &path).await?;
            Ok(())
        })
    }

    fn record_throw(
        &self,
        match_id: String,
        command: ThrowCommand,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<RecordedThrow>> {
        let api = self.clone();
        Box::pin(async move {
            let path = format!("matches/{match_id}/throws");
            let builder = api.request(Method::POST, &path, &session_id).json(&command);
            let envelope = Self::send_json::<ThrowRecord, ThrowMeta>(builder, &path).await?;
            Ok(RecordedThrow {
                throw: envelope.data,
                meta: envelope.meta.unwrap_or_default(),
            })
        })
    }

    fn get_match(
        &self,
        match_id: String,
        session_id: String,
        include: Vec<String>,
    ) -> BoxFuture<'static, RemoteResult<MatchSnapshot>> {
        let api = self.clone();
        Box::pin(async move {
            let path = format!("matches/{match_id}");
            let mut builder = api.request(Method::GET, &path, &session_id);
            if !include.is_empty() {
                builder = builder.query(&[("include", include.join(","))]);
            }
            let envelope =
                Self::send_json::<MatchSnapshot, serde_json::Value>(builder, &path).await?;
            Ok(envelope.data)
        })
    }

    fn get_match_stats(
        &self,
        match_id: String,
        leg: Option<u32>,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<Vec<PlayerStats>>> {
        let api = self.clone();
        Box::pin(async move {
            let path = format!("matches/{match_id}/stats");
            let mut builder = api.request(Method::GET, &path, &session_id);
            if let Some(leg) = leg {
                builder = builder.query(&[("leg", leg)]);
            }
            let envelope =
                Self::send_json::<Vec<PlayerStats>, serde_json::Value>(builder, &path).await?;
            Ok(envelope.data)
        })
    }

    fn end_match(
        &self,
        match_id: String,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<()>> {
        let api = self.clone();
        Box::pin(async move {
            let path = format!("matches/{match_id}/end");
            let builder = api.request(Method::POST, &path, &session_id);
            Self::send(builder, &path).await?;
            Ok(())
        })
    }

    fn update_match(
        &self,
        match_id: String,
        patch: MatchPatch,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<()>> {
        let api = self.clone();
        Box::pin(async move {
            let path = format!("matches/{match_id}");
            let builder = api.request(Method::PATCH, &path, &session_id).json(&patch);
            Self::send(builder, &path).await?;
            Ok(())
        })
    }
}
