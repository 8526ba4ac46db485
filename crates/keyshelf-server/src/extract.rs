//! Extractors whose rejections render as [`AppError`] bodies.

use axum::extract::{FromRequest, FromRequestParts};
use serde::de::{self, Deserialize, Deserializer};

use crate::error::AppError;

/// JSON request body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Payload<T>(pub T);

/// Query string.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

/// Path parameters.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`.
pub(crate) fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// A query-string id where `project_id=` and `project_id=null` mean "none".
pub(crate) fn optional_id<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("" | "null") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid id '{v}'"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default, deserialize_with = "double_option")]
        project_id: Option<Option<i64>>,
    }

    #[derive(Debug, Deserialize)]
    struct Filter {
        #[serde(default, deserialize_with = "optional_id")]
        project_id: Option<i64>,
    }

    #[test]
    fn absent_and_null_differ() {
        let absent: Body = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.project_id, None);
        let null: Body = serde_json::from_str(r#"{"project_id": null}"#).unwrap();
        assert_eq!(null.project_id, Some(None));
        let set: Body = serde_json::from_str(r#"{"project_id": 4}"#).unwrap();
        assert_eq!(set.project_id, Some(Some(4)));
    }

    #[test]
    fn blank_query_ids_are_none() {
        let parse = |raw: &str| {
            let uri: axum::http::Uri = format!("/keys?{raw}").parse().unwrap();
            axum::extract::Query::<Filter>::try_from_uri(&uri).map(|q| q.0.project_id)
        };
        assert_eq!(parse("project_id=").unwrap(), None);
        assert_eq!(parse("project_id=null").unwrap(), None);
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("project_id=7").unwrap(), Some(7));
        assert!(parse("project_id=seven").is_err());
    }
}
