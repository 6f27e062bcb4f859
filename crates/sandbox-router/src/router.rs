use std::sync::Arc;

use hyper::{body::Bytes, header::HOST, Request, Response, StatusCode};
use sandbox_core::{
    clock::{SharedClock, SystemClock},
    convert::DocumentConverter,
    storage::{expiry_after, ObjectMetadata, ObjectStore, PutOptions},
};
use sandbox_storage::{
    envelope::{self, EnvelopeTransform, Rights, StoredEnvelope},
    tokens::{generate_token, CapabilityKeys, LocationId},
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    action::Action,
    config::SandboxConfig,
    error::{RouterError, TokenPart},
    response::{self, Body},
};

/// Stateless request handler. The object store is the only durable state.
pub struct Router {
    config: SandboxConfig,
    store: Arc<dyn ObjectStore>,
    converter: Arc<dyn DocumentConverter>,
    transform: Arc<dyn EnvelopeTransform>,
    clock: SharedClock,
}

/// Envelope whose rights field accepted the presented token.
struct Authorized<'a> {
    key1: &'a str,
    key2: &'a str,
    storage_key: String,
    envelope: StoredEnvelope,
}

impl Router {
    pub fn new(
        config: SandboxConfig,
        store: Arc<dyn ObjectStore>,
        converter: Arc<dyn DocumentConverter>,
    ) -> Self {
        let transform = envelope::transform_for(config.encryption);
        Self {
            config,
            store,
            converter,
            transform,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for expiry metadata and remaining-lifetime reporting.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Route a request with a fully buffered body. Never fails: errors become
    /// their status-coded responses.
    #[instrument(skip_all, fields(method = %req.method()))]
    pub async fn handle(&self, req: Request<Bytes>) -> Response<Body> {
        let base = self.base_url(&req);
        let (parts, body) = req.into_parts();
        let action = Action::parse(&parts.method, parts.uri.path());
        debug!(action = action.kind(), "dispatching");

        let result = match action {
            Action::Head => Ok(response::head()),
            Action::Preflight => Ok(response::preflight()),
            Action::Landing => Ok(response::text(
                StatusCode::OK,
                self.config.banner.clone(),
            )),
            Action::Create => self.create(&base, &body).await,
            Action::Read { location } => self.read(location).await,
            Action::Update { location, token } => self.update(&base, location, token, &body).await,
            Action::Delete {
                location,
                token,
                rights,
            } => self.delete(location, token, rights).await,
            Action::NotFound => Ok(response::not_found()),
        };

        result.unwrap_or_else(|err| {
            match &err {
                RouterError::Encoding(_) | RouterError::Storage(_) => {
                    error!(action = action.kind(), "request failed: {err}")
                }
                _ => debug!(action = action.kind(), "request rejected: {err}"),
            }
            response::error(&err)
        })
    }

    async fn create(&self, base: &str, body: &Bytes) -> Result<Response<Body>, RouterError> {
        let raw = validate_resource(body)?;
        let document = self.converter.convert(&raw).await?;

        let keys = CapabilityKeys::generate(self.config.token_lengths());
        let storage_key = self.transform.storage_key(&keys.key1, &keys.key2);
        let envelope = StoredEnvelope {
            update: self
                .transform
                .seal_rights(&keys.update, &keys.key2)
                .map_err(RouterError::Encoding)?,
            delete: self
                .transform
                .seal_rights(&keys.delete, &keys.key2)
                .map_err(RouterError::Encoding)?,
            document: self
                .transform
                .seal_document(&document, &keys.key1)
                .map_err(RouterError::Encoding)?,
        };
        self.persist(&storage_key, &envelope).await?;
        info!(key = %redact(&storage_key), mode = self.transform.name(), "object created");

        let location = keys.location_id();
        Ok(response::json(
            StatusCode::CREATED,
            &json!({
                "location": format!("{base}p3/{location}"),
                "updateLocation": format!("{base}update/{location}/{}", keys.update),
                "deleteLocation": format!("{base}delete/{location}/{}", keys.delete),
                "expirationTtl": self.config.expiration_ttl,
            }),
        ))
    }

    async fn read(&self, location: &str) -> Result<Response<Body>, RouterError> {
        let loc = LocationId::split(location, self.config.part_length);
        if !loc.is_complete() {
            return Err(RouterError::InvalidIdentifier);
        }

        let storage_key = self.transform.storage_key(loc.key1, loc.key2);
        let object = self.store.get_with_metadata(&storage_key).await?;
        let envelope = envelope::decode(&object.value).map_err(|_| RouterError::NotFound)?;
        let document = self
            .transform
            .open_document(&envelope.document, loc.key1)
            .map_err(|_| RouterError::NotFound)?;

        let ttl = object.metadata.map(|meta| meta.ttl).unwrap_or(0);
        let expires_in = remaining_secs(ttl, self.clock.now_millis());
        Ok(response::document(&document, expires_in))
    }

    async fn update(
        &self,
        base: &str,
        location: &str,
        token: &str,
        body: &Bytes,
    ) -> Result<Response<Body>, RouterError> {
        let auth = self.authorize(location, token, Rights::Update).await?;

        let raw = validate_resource(body)?;
        let document = self.converter.convert(&raw).await?;
        let update_token = if self.config.rotate_update_token {
            generate_token(self.config.action_length)
        } else {
            token.to_string()
        };

        let envelope = StoredEnvelope {
            update: self
                .transform
                .seal_rights(&update_token, auth.key2)
                .map_err(RouterError::Encoding)?,
            delete: auth.envelope.delete,
            document: self
                .transform
                .seal_document(&document, auth.key1)
                .map_err(RouterError::Encoding)?,
        };
        self.persist(&auth.storage_key, &envelope).await?;
        info!(
            key = %redact(&auth.storage_key),
            rotated = self.config.rotate_update_token,
            "object updated"
        );

        let location = format!("{}{}", auth.key1, auth.key2);
        Ok(response::json(
            StatusCode::OK,
            &json!({
                "location": format!("{base}p3/{location}"),
                "updateLocation": format!("{base}update/{location}/{update_token}"),
                "expirationTtl": self.config.expiration_ttl,
            }),
        ))
    }

    async fn delete(
        &self,
        location: &str,
        token: &str,
        rights: Rights,
    ) -> Result<Response<Body>, RouterError> {
        let auth = self.authorize(location, token, rights).await?;
        self.store.delete(&auth.storage_key).await?;
        info!(key = %redact(&auth.storage_key), ?rights, "object deleted");
        Ok(response::text(StatusCode::OK, "Deleted"))
    }

    /// Shared preamble of update and delete: every token present, envelope
    /// live and well-formed, presented token accepted by the rights field.
    #[instrument(skip_all, fields(?rights))]
    async fn authorize<'a>(
        &self,
        location: &'a str,
        token: &str,
        rights: Rights,
    ) -> Result<Authorized<'a>, RouterError> {
        let loc = LocationId::split(location, self.config.part_length);
        if loc.key1.is_empty() {
            return Err(RouterError::MissingToken(TokenPart::Key1));
        }
        if loc.key2.is_empty() {
            return Err(RouterError::MissingToken(TokenPart::Key2));
        }
        if token.is_empty() {
            return Err(RouterError::MissingToken(TokenPart::Key3));
        }

        let storage_key = self.transform.storage_key(loc.key1, loc.key2);
        let bytes = self.store.get(&storage_key).await?;
        let envelope = envelope::decode(&bytes).map_err(|_| RouterError::NotFound)?;

        if !self
            .transform
            .verify_rights(envelope.rights(rights), token, loc.key2)
        {
            warn!(key = %redact(&storage_key), "capability check failed");
            return Err(RouterError::Unauthorized);
        }

        Ok(Authorized {
            key1: loc.key1,
            key2: loc.key2,
            storage_key,
            envelope,
        })
    }

    async fn persist(&self, storage_key: &str, envelope: &StoredEnvelope) -> Result<(), RouterError> {
        let bytes = envelope::encode(envelope).map_err(RouterError::Encoding)?;
        let ttl = self.config.expiration_ttl;
        let options = PutOptions {
            expiration_ttl: ttl,
            metadata: Some(ObjectMetadata {
                ttl: expiry_after(self.clock.now_millis(), ttl),
            }),
        };
        self.store.put(storage_key, &bytes, options).await?;
        Ok(())
    }

    /// Base URL (with trailing slash) for the capability URLs in responses.
    fn base_url<B>(&self, req: &Request<B>) -> String {
        if let Some(url) = &self.config.public_url {
            return with_trailing_slash(url);
        }
        let uri = req.uri();
        if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
            return format!("{scheme}://{authority}/");
        }
        if let Some(host) = req.headers().get(HOST).and_then(|h| h.to_str().ok()) {
            return format!("http://{host}/");
        }
        "http://localhost/".to_string()
    }
}

/// Parse a submitted resource and check it names itself and its type.
fn validate_resource(body: &Bytes) -> Result<Value, RouterError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RouterError::InvalidInput(format!("Invalid JSON body: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| RouterError::InvalidInput("Resource must be a JSON object".to_string()))?;

    let has_id = ["id", "@id"].iter().any(|field| {
        obj.get(*field)
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty())
    });
    if !has_id {
        return Err(RouterError::InvalidInput(
            "Invalid or missing Identifier".to_string(),
        ));
    }

    let is_manifest = obj.get("type").and_then(Value::as_str) == Some("Manifest")
        || obj.get("@type").and_then(Value::as_str) == Some("sc:Manifest");
    if !is_manifest {
        return Err(RouterError::InvalidInput(
            "Resource must be Manifest".to_string(),
        ));
    }

    Ok(value)
}

/// Whole seconds until `expires_at`, rounded down; negative once stale.
fn remaining_secs(expires_at: i64, now: i64) -> i64 {
    expires_at.saturating_sub(now).div_euclid(1000)
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

/// First few characters of a key, enough to correlate log lines.
fn redact(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}…")
}
