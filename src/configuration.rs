pub trait Configuration: Clone + Send + Sync + 'static {
    fn bind_address(&self) -> String;
    fn port(&self) -> String;
    fn database_url(&self) -> Option<String>;
}
