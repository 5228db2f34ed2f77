use url::Url;

use crate::error::Error;

/// Identity service endpoint paths, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub profile: String,
    pub change_password: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/api/auth/login/".into(),
            register: "/api/auth/register/".into(),
            profile: "/api/auth/profile/".into(),
            change_password: "/api/auth/change-password/".into(),
        }
    }
}

/// Fund-transfer API client configuration.
///
/// The base URL is a constructor parameter; endpoint paths default to the
/// identity service's routes and can be overridden by chaining.
///
/// ```rust,ignore
/// use fundtransfer_accounts::ClientConfig;
///
/// let config = ClientConfig::new("https://transfers.example.com".parse()?)
///     .with_profile_path("/api/v2/auth/profile/");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) base_url: Url,
    pub(crate) endpoints: Endpoints,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            endpoints: Endpoints::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `FUNDTRANSFER_API_URL`: API base URL
    ///
    /// # Optional env vars
    /// - `FUNDTRANSFER_LOGIN_PATH`
    /// - `FUNDTRANSFER_REGISTER_PATH`
    /// - `FUNDTRANSFER_PROFILE_PATH`
    /// - `FUNDTRANSFER_CHANGE_PASSWORD_PATH`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let base_url = lookup("FUNDTRANSFER_API_URL")
            .ok_or_else(|| Error::Config("FUNDTRANSFER_API_URL is required".into()))?;
        let base_url: Url = base_url
            .parse()
            .map_err(|e| Error::Config(format!("FUNDTRANSFER_API_URL: {e}")))?;

        let mut config = Self::new(base_url);
        if let Some(path) = lookup("FUNDTRANSFER_LOGIN_PATH") {
            config = config.with_login_path(path);
        }
        if let Some(path) = lookup("FUNDTRANSFER_REGISTER_PATH") {
            config = config.with_register_path(path);
        }
        if let Some(path) = lookup("FUNDTRANSFER_PROFILE_PATH") {
            config = config.with_profile_path(path);
        }
        if let Some(path) = lookup("FUNDTRANSFER_CHANGE_PASSWORD_PATH") {
            config = config.with_change_password_path(path);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.login = path.into();
        self
    }

    #[must_use]
    pub fn with_register_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.register = path.into();
        self
    }

    #[must_use]
    pub fn with_profile_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.profile = path.into();
        self
    }

    #[must_use]
    pub fn with_change_password_path(mut self, path: impl Into<String>) -> Self {
        self.endpoints.change_password = path.into();
        self
    }

    /// API base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}
