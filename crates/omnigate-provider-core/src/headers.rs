/// Ordered header list; names compare case-insensitively.
pub type Headers = Vec<(String, String)>;

/// Replace the first header named `name`, or append it.
pub fn header_set(headers: &mut Headers, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let value = value.into();
    match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
        Some((_, slot)) => *slot = value,
        None => headers.push((name, value)),
    }
}

pub fn header_get<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub fn header_remove(headers: &mut Headers, name: &str) -> Option<String> {
    let idx = headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))?;
    Some(headers.remove(idx).1)
}

/// `Authorization: Bearer <token>`.
pub fn bearer(headers: &mut Headers, token: &str) {
    header_set(headers, "Authorization", format!("Bearer {token}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_insensitive() {
        let mut headers = Headers::new();
        header_set(&mut headers, "Content-Type", "application/json");
        header_set(&mut headers, "content-type", "text/plain");
        assert_eq!(headers.len(), 1);
        assert_eq!(header_get(&headers, "CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(
            header_remove(&mut headers, "Content-type").as_deref(),
            Some("text/plain")
        );
        assert!(headers.is_empty());
    }

    #[test]
    fn bearer_overwrites_existing_auth() {
        let mut headers = vec![("authorization".to_string(), "Basic abc".to_string())];
        bearer(&mut headers, "tok");
        assert_eq!(header_get(&headers, "Authorization"), Some("Bearer tok"));
    }
}
