use anyhow::{Context, Result, anyhow};
use url::Url;

/// Sanity checks `DATABASE_URL` before a pool is built, so a bad value
/// fails startup with a readable message instead of a connect timeout.
pub fn validate_database_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw).context("invalid PostgreSQL URL")?;

    match url.scheme() {
        "postgres" | "postgresql" => {}
        other => {
            return Err(anyhow!(
                "unsupported database scheme `{other}`, expected postgres://"
            ));
        }
    }

    if url.path().trim_start_matches('/').is_empty() {
        return Err(anyhow!("database URL must include database name"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_postgres_urls_with_database_names() {
        validate_database_url("postgres://rw:pw@localhost:5432/reelworks")
            .unwrap();
        validate_database_url("postgresql://localhost/reelworks").unwrap();
    }

    #[test]
    fn rejects_missing_database_name_and_foreign_schemes() {
        assert!(validate_database_url("postgres://localhost:5432").is_err());
        assert!(validate_database_url("mysql://localhost/reelworks").is_err());
        assert!(validate_database_url("not a url").is_err());
    }
}
