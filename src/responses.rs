use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// ApiResponse
///
/// The envelope every endpoint answers with, success or failure. Fields are
/// serialized in declaration order and `None` values are written as `null`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    /// A short error code, or a field -> message map for validation failures.
    #[schema(value_type = Object)]
    pub errors: Option<Value>,
    pub message: String,
    pub success: bool,
    #[serde(with = "timestamp_format")]
    #[schema(value_type = String, example = "2025-03-01T10:15:30Z")]
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            errors: None,
            message: message.into(),
            success: true,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>, errors: Value) -> Self {
        Self {
            data: None,
            errors: Some(errors),
            message: message.into(),
            success: false,
            timestamp: Utc::now(),
        }
    }
}

/// `yyyy-MM-ddTHH:mm:ssZ`, second precision, always UTC.
mod timestamp_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(D::Error::custom)
    }
}

/// PageResponse
///
/// One page of a sorted listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub results: Vec<T>,
    pub total_pages: u64,
    pub total_elements: u64,
    pub last_page: bool,
}

impl<T> PageResponse<T> {
    pub fn new(results: Vec<T>, total_elements: u64, page: u32, size: u32) -> Self {
        let size = u64::from(size.max(1));
        let total_pages = total_elements.div_ceil(size);
        Self {
            results,
            total_pages,
            total_elements,
            last_page: u64::from(page) + 1 >= total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResponse<U> {
        PageResponse {
            results: self.results.into_iter().map(f).collect(),
            total_pages: self.total_pages,
            total_elements: self.total_elements,
            last_page: self.last_page,
        }
    }
}
