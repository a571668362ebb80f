use thiserror::Error;

/// Failure while pulling card data out of a catalog page.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector `{css}`: {reason}")]
    Selector { css: &'static str, reason: String },

    #[error("page has no `{0}` element")]
    PageNotReady(&'static str),

    #[error("card #{index}: missing `{element}`")]
    MissingElement {
        index: usize,
        element: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no region configured; pass --region or set OPTCG_REGION (one of: {0})")]
    MissingRegion(String),
}
