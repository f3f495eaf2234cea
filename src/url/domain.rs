use url::Url;

/// Returns the politeness key of a URL: the lowercase host, plus the port when it is
/// not the scheme default
///
/// Two servers on the same machine but different ports are separate hosts for rate
/// limiting purposes.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use med_harvest::url::host_key;
///
/// let url = Url::parse("https://WWW.msdmanuals.com/home/").unwrap();
/// assert_eq!(host_key(&url), Some("www.msdmanuals.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/a").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Returns the lowercase host name of a URL without any port
pub fn host_name(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Builds the robots.txt URL serving a page's host
pub fn robots_url(url: &Url) -> Option<Url> {
    url.join("/robots.txt").ok()
}
