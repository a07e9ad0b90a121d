/// Environment variable holding the port to listen on.
pub const PORT_ENV: &str = "PORT";

/// Port used when [`PORT_ENV`] is unset or empty.
pub const DEFAULT_PORT: &str = "8080";

/// Listener configuration.
///
/// The port is kept verbatim, it is only interpreted when the listener binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    port: String,
}

impl Config {
    pub fn new(port: impl Into<String>) -> Self {
        Self { port: port.into() }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration with a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(PORT_ENV) {
            Some(port) if !port.is_empty() => Self::new(port),
            _ => Self::default(),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Address as shown in logs and errors, `":<port>"`.
    pub fn address(&self) -> String {
        format!(":{}", self.port)
    }

    /// Socket address the listener binds to, all interfaces, IPv4 included.
    pub(crate) fn bind_address(&self) -> String {
        format!("[::]:{}", self.port)
    }

    /// Used when the host has no IPv6 support.
    pub(crate) fn ipv4_bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_to_8080_when_unset() {
        let config = Config::from_lookup(|_| None);

        assert_eq!(config.port(), "8080");
        assert_eq!(config.address(), ":8080");
        assert_eq!(config.bind_address(), "[::]:8080");
        assert_eq!(config.ipv4_bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn empty_value_falls_back_to_default() {
        let config = Config::from_lookup(|_| Some(String::new()));

        assert_eq!(config, Config::default());
    }

    #[test]
    fn port_is_used_verbatim() {
        let config = Config::from_lookup(|key| {
            assert_eq!(key, PORT_ENV);
            Some("9191".to_owned())
        });
        assert_eq!(config.address(), ":9191");

        let config = Config::from_lookup(|_| Some("not-a-port".to_owned()));
        assert_eq!(config.port(), "not-a-port");
    }

    #[test]
    #[serial]
    fn reads_port_from_environment() {
        std::env::set_var(PORT_ENV, "18123");
        assert_eq!(Config::from_env().port(), "18123");

        std::env::remove_var(PORT_ENV);
        assert_eq!(Config::from_env().port(), DEFAULT_PORT);
    }
}
