use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

static OFFSET_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]offset=(\d+)").expect("valid offset pattern"));

/// Position of the next page, as reported by the `next` link of a reviews response.
///
/// The link is usually a relative URL such as
/// `/v1/catalog/us/apps/123/reviews?l=en-GB&offset=20&limit=20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NextPage {
    pub offset: u32,
}

impl FromStr for NextPage {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = OFFSET_PARAM
            .captures(s)
            .ok_or_else(|| CursorError::MissingOffset(s.to_string()))?;
        let offset = captures[1].parse()?;
        Ok(NextPage { offset })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("offset not found in next link: {0}")]
    MissingOffset(String),
    #[error("invalid offset: {0}")]
    InvalidOffset(#[from] std::num::ParseIntError),
}
