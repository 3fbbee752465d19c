use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::constants::DEFAULT_SERVER;

pub type ServiceResult<T> = core::result::Result<T, ServiceError>;

#[derive(Debug, Error, Clone)]
pub enum ServiceError {
    #[error("image service failure: {0}")]
    Image(String),

    #[error("server list unavailable for '{channel}': {reason}")]
    ServerList { channel: String, reason: String },
}

/// Opaque image produced by an [`ImageService`].
///
/// The engine never looks inside; consumers downcast back to whatever their service produced.
#[derive(Clone)]
pub struct ImageHandle(Arc<dyn Any + Send + Sync>);

impl ImageHandle {
    pub fn new<T: Any + Send + Sync>(image: T) -> Self {
        Self(Arc::new(image))
    }

    pub fn from_arc(image: Arc<dyn Any + Send + Sync>) -> Self {
        Self(image)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageHandle({:p})", Arc::as_ptr(&self.0))
    }
}

/// Two handles are equal when they point at the same image
impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Badge roles a channel can publish art for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BadgeRole {
    Admin,
    Broadcaster,
    GlobalMod,
    Mod,
    Staff,
    Subscriber,
    Turbo,
}

impl BadgeRole {
    pub fn from_badge_name(name: &str) -> Option<Self> {
        Some(match name {
            "admin" => BadgeRole::Admin,
            "broadcaster" => BadgeRole::Broadcaster,
            "global_mod" => BadgeRole::GlobalMod,
            "moderator" => BadgeRole::Mod,
            "staff" => BadgeRole::Staff,
            "subscriber" => BadgeRole::Subscriber,
            "turbo" => BadgeRole::Turbo,
            _ => return None,
        })
    }
}

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn fetch_emote_image(&self, id: u64) -> ServiceResult<Option<ImageHandle>>;

    async fn fetch_badge_set(&self, channel: &str) -> ServiceResult<HashMap<BadgeRole, ImageHandle>>;
}

pub trait CredentialProvider: Send + Sync {
    fn oauth_token(&self) -> Option<String>;

    fn user_name(&self) -> Option<String>;
}

#[async_trait]
pub trait ServerListProvider: Send + Sync {
    /// Candidate `host:port` endpoints for `channel`
    async fn chat_servers_for(&self, channel: &str) -> ServiceResult<Vec<String>>;
}

/// Image service for consumers that do not render images
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImages;

#[async_trait]
impl ImageService for NoImages {
    async fn fetch_emote_image(&self, _id: u64) -> ServiceResult<Option<ImageHandle>> {
        Ok(None)
    }

    async fn fetch_badge_set(&self, _channel: &str) -> ServiceResult<HashMap<BadgeRole, ImageHandle>> {
        Ok(HashMap::new())
    }
}

/// Always-anonymous credentials
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl CredentialProvider for Anonymous {
    fn oauth_token(&self) -> Option<String> {
        None
    }

    fn user_name(&self) -> Option<String> {
        None
    }
}

/// Same endpoint list for every channel
#[derive(Debug, Clone)]
pub struct StaticServers(Vec<String>);

impl StaticServers {
    pub fn new(servers: Vec<String>) -> Self {
        Self(servers)
    }
}

impl Default for StaticServers {
    fn default() -> Self {
        Self(vec![DEFAULT_SERVER.to_string()])
    }
}

#[async_trait]
impl ServerListProvider for StaticServers {
    async fn chat_servers_for(&self, _channel: &str) -> ServiceResult<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Collaborators handed to a session at construction
#[derive(Clone)]
pub struct Services {
    pub images: Arc<dyn ImageService>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub servers: Arc<dyn ServerListProvider>,
}

impl Services {
    pub fn new(
        images: Arc<dyn ImageService>,
        credentials: Arc<dyn CredentialProvider>,
        servers: Arc<dyn ServerListProvider>,
    ) -> Self {
        Self {
            images,
            credentials,
            servers,
        }
    }

    pub fn with_images(mut self, images: Arc<dyn ImageService>) -> Self {
        self.images = images;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_servers(mut self, servers: Arc<dyn ServerListProvider>) -> Self {
        self.servers = servers;
        self
    }

    /// Token and username, with empty strings treated as absent
    pub fn credentials(&self) -> (Option<String>, Option<String>) {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        (
            non_empty(self.credentials.oauth_token()),
            non_empty(self.credentials.user_name()),
        )
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new(
            Arc::new(NoImages),
            Arc::new(Anonymous),
            Arc::new(StaticServers::default()),
        )
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
