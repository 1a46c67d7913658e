/// Connection settings for a WAMP router.
#[derive(Debug, Clone)]
pub struct WampConfig {
    pub url: String,
    pub realm: String,
    pub authid: String,
    pub secret: String,
}

impl WampConfig {
    /// Construct a configuration for `realm` on the router at `url`, without credentials.
    pub fn new(url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            realm: realm.into(),
            authid: String::new(),
            secret: String::new(),
        }
    }

    /// Attach challenge-response credentials.
    pub fn with_credentials(mut self, authid: impl Into<String>, secret: impl Into<String>) -> Self {
        self.authid = authid.into();
        self.secret = secret.into();
        self
    }
}
