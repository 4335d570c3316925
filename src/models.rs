use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::{collections::BTreeMap, fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::security::Principal;

pub const TITLE_MAX_CHARS: usize = 255;

// --- Enumerations ---

/// ClimateZone
///
/// Biogeographical region an NBS belongs to. Parsed case-insensitively from the
/// variant name; displayed in title case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ClimateZone {
    Atlantic,
    Boreal,
    Continental,
    Mediterranean,
}

impl ClimateZone {
    pub const ALL: [ClimateZone; 4] = [
        Self::Atlantic,
        Self::Boreal,
        Self::Continental,
        Self::Mediterranean,
    ];

    /// The stored (and serialized) form.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Atlantic => "ATLANTIC",
            Self::Boreal => "BOREAL",
            Self::Continental => "CONTINENTAL",
            Self::Mediterranean => "MEDITERRANEAN",
        }
    }
}

impl fmt::Display for ClimateZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Atlantic => "Atlantic",
            Self::Boreal => "Boreal",
            Self::Continental => "Continental",
            Self::Mediterranean => "Mediterranean",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl FromStr for ClimateZone {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|zone| zone.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "climate zone",
                value: value.to_string(),
            })
    }
}

impl<'de> Deserialize<'de> for ClimateZone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

/// NbsStatus
///
/// Implementation stage of an NBS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum NbsStatus {
    ToBeImplemented,
    UnderImplementation,
    Implemented,
}

impl NbsStatus {
    pub const ALL: [NbsStatus; 3] = [
        Self::ToBeImplemented,
        Self::UnderImplementation,
        Self::Implemented,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ToBeImplemented => "TO_BE_IMPLEMENTED",
            Self::UnderImplementation => "UNDER_IMPLEMENTATION",
            Self::Implemented => "IMPLEMENTED",
        }
    }
}

impl fmt::Display for NbsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ToBeImplemented => "To be Implemented",
            Self::UnderImplementation => "Under Implementation",
            Self::Implemented => "Implemented",
        };
        f.write_str(label)
    }
}

impl FromStr for NbsStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "NBS status",
                value: value.to_string(),
            })
    }
}

impl<'de> Deserialize<'de> for NbsStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

// --- Catalog Records ---

/// GeoLocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GeoLocation {
    #[schema(example = 41.3874)]
    pub latitude: f64,
    #[schema(example = 2.1686)]
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Nbs
///
/// A Nature-Based Solution as stored in the `nbs` table. Media fields hold
/// object-storage keys, produced by the presigned upload flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Nbs {
    pub id: Uuid,
    pub title: String,
    pub climate_zone: ClimateZone,
    pub geo_location: GeoLocation,
    pub status: NbsStatus,
    pub pilot: String,
    #[serde(rename = "isUrBreathNbs")]
    pub is_urbreath_nbs: bool,
    pub related_material: Vec<String>,
    #[ts(type = "string")]
    pub date_created: DateTime<Utc>,

    // Description texts
    pub area_characterization: String,
    pub objective: String,
    pub challenges: String,
    pub potential_impacts_and_benefits: String,
    pub lessons_learnt: String,
    pub keywords: Vec<String>,
    pub problems: Vec<String>,

    // Storage keys
    pub main_image: String,
    pub images: Vec<String>,
    pub videos: Vec<String>,

    // References into the upstream data services
    pub idra_datasets: Vec<String>,
    pub kpis: Vec<String>,
}

/// NbsSummary
///
/// The brief card returned by the paginated listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NbsSummary {
    pub id: Uuid,
    pub title: String,
    pub climate_zone: ClimateZone,
    pub pilot: String,
    pub main_image: String,
    pub geo_location: GeoLocation,
    #[serde(rename = "isUrBreathNbs")]
    pub is_urbreath_nbs: bool,
    pub keywords: Vec<String>,
    pub objective: String,
}

impl From<Nbs> for NbsSummary {
    fn from(nbs: Nbs) -> Self {
        Self {
            id: nbs.id,
            title: nbs.title,
            climate_zone: nbs.climate_zone,
            pilot: nbs.pilot,
            main_image: nbs.main_image,
            geo_location: nbs.geo_location,
            is_urbreath_nbs: nbs.is_urbreath_nbs,
            keywords: nbs.keywords,
            objective: nbs.objective,
        }
    }
}

// --- Request Payloads ---

/// Field name -> message, serialized as the `errors` object of a 400 response.
pub type ValidationErrors = BTreeMap<&'static str, String>;

/// CreateNbsRequest
///
/// Payload for `POST /api/manage/nbs`. Every field is optional at the JSON
/// level so that missing values are reported together by `validated`, rather
/// than one at a time by the deserializer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct CreateNbsRequest {
    pub title: String,
    pub climate_zone: Option<ClimateZone>,
    pub geo_location: Option<GeoLocation>,
    pub status: Option<NbsStatus>,
    pub pilot: String,
    #[serde(rename = "isUrBreathNbs")]
    pub is_urbreath_nbs: bool,
    pub related_material: Vec<String>,
    pub area_characterization: String,
    pub objective: String,
    pub challenges: String,
    pub potential_impacts_and_benefits: String,
    pub lessons_learnt: String,
    pub keywords: Vec<String>,
    pub problems: Vec<String>,
    pub main_image: String,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub idra_datasets: Vec<String>,
    pub kpis: Vec<String>,
}

/// NewNbs
///
/// A create request that passed validation; the repository assigns id and
/// creation date on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNbs {
    pub title: String,
    pub climate_zone: ClimateZone,
    pub geo_location: GeoLocation,
    pub status: NbsStatus,
    pub pilot: String,
    pub is_urbreath_nbs: bool,
    pub related_material: Vec<String>,
    pub area_characterization: String,
    pub objective: String,
    pub challenges: String,
    pub potential_impacts_and_benefits: String,
    pub lessons_learnt: String,
    pub keywords: Vec<String>,
    pub problems: Vec<String>,
    pub main_image: String,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub idra_datasets: Vec<String>,
    pub kpis: Vec<String>,
}

impl NewNbs {
    pub fn into_nbs(self, id: Uuid, date_created: DateTime<Utc>) -> Nbs {
        Nbs {
            id,
            title: self.title,
            climate_zone: self.climate_zone,
            geo_location: self.geo_location,
            status: self.status,
            pilot: self.pilot,
            is_urbreath_nbs: self.is_urbreath_nbs,
            related_material: self.related_material,
            date_created,
            area_characterization: self.area_characterization,
            objective: self.objective,
            challenges: self.challenges,
            potential_impacts_and_benefits: self.potential_impacts_and_benefits,
            lessons_learnt: self.lessons_learnt,
            keywords: self.keywords,
            problems: self.problems,
            main_image: self.main_image,
            images: self.images,
            videos: self.videos,
            idra_datasets: self.idra_datasets,
            kpis: self.kpis,
        }
    }
}

impl CreateNbsRequest {
    /// validated
    ///
    /// Checks every constraint and reports all violations at once, keyed by the
    /// JSON field name.
    pub fn validated(self) -> Result<NewNbs, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = self.title.trim();
        if title.is_empty() {
            errors.insert("title", "Title is required".into());
        } else if title.chars().count() > TITLE_MAX_CHARS {
            errors.insert("title", "Title must be less than 255 characters".into());
        }

        if self.climate_zone.is_none() {
            errors.insert("climateZone", "Climate zone is required".into());
        }
        if self.status.is_none() {
            errors.insert("status", "NBS status is required".into());
        }
        match &self.geo_location {
            None => {
                errors.insert("geoLocation", "Geolocation is required".into());
            }
            Some(location) if !(-90.0..=90.0).contains(&location.latitude) => {
                errors.insert("geoLocation", "Latitude must be between -90 and 90".into());
            }
            Some(location) if !(-180.0..=180.0).contains(&location.longitude) => {
                errors.insert("geoLocation", "Longitude must be between -180 and 180".into());
            }
            Some(_) => {}
        }

        let required_texts = [
            ("pilot", &self.pilot, "Pilot is required"),
            ("areaCharacterization", &self.area_characterization, "Area characterization is required"),
            ("objective", &self.objective, "Objective is required"),
            ("challenges", &self.challenges, "Challenges is required"),
            (
                "potentialImpactsAndBenefits",
                &self.potential_impacts_and_benefits,
                "Potential impacts and benefits is required",
            ),
            ("lessonsLearnt", &self.lessons_learnt, "Lessons learnt is required"),
            ("mainImage", &self.main_image, "Main image is required"),
        ];
        for (field, value, message) in required_texts {
            if value.trim().is_empty() {
                errors.insert(field, message.into());
            }
        }

        let required_lists = [
            ("keywords", &self.keywords, "Keywords are required"),
            ("problems", &self.problems, "Problems are required"),
            ("idraDatasets", &self.idra_datasets, "Idra datasets are required"),
            ("kpis", &self.kpis, "KPIs are required"),
        ];
        for (field, values, message) in required_lists {
            if values.iter().all(|value| value.trim().is_empty()) {
                errors.insert(field, message.into());
            }
        }

        match (self.climate_zone, self.status, self.geo_location) {
            (Some(climate_zone), Some(status), Some(geo_location)) if errors.is_empty() => {
                Ok(NewNbs {
                    title: title.to_string(),
                    climate_zone,
                    geo_location,
                    status,
                    pilot: self.pilot,
                    is_urbreath_nbs: self.is_urbreath_nbs,
                    related_material: self.related_material,
                    area_characterization: self.area_characterization,
                    objective: self.objective,
                    challenges: self.challenges,
                    potential_impacts_and_benefits: self.potential_impacts_and_benefits,
                    lessons_learnt: self.lessons_learnt,
                    keywords: self.keywords,
                    problems: self.problems,
                    main_image: self.main_image,
                    images: self.images,
                    videos: self.videos,
                    idra_datasets: self.idra_datasets,
                    kpis: self.kpis,
                })
            }
            _ => Err(errors),
        }
    }
}

/// PresignedUrlRequest
///
/// Asks for a short-lived upload URL for one media asset of an NBS.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// Title of the NBS the asset belongs to; prefixes the object key.
    #[schema(example = "Green Roofs of Barcelona")]
    pub nbs_title: String,
    #[schema(example = "roof_overview.jpg")]
    pub filename: String,
    /// The upload is constrained to this MIME type.
    #[schema(example = "image/jpeg")]
    pub content_type: String,
}

/// PresignedUrlResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// Time-limited URL for the PUT request.
    pub upload_url: String,
    /// Object key to reference from `mainImage`, `images` or `videos`.
    pub resource_key: String,
}

/// CreatedResource
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatedResource {
    pub id: Uuid,
}

/// ProfileResponse
///
/// The caller's identity as resolved from their token (`GET /api/me`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProfileResponse {
    pub subject: String,
    pub display_name: String,
    pub authorities: Vec<String>,
}

impl From<&Principal> for ProfileResponse {
    fn from(principal: &Principal) -> Self {
        Self {
            subject: principal.subject.clone(),
            display_name: principal.display_name.clone(),
            authorities: principal
                .authorities
                .iter()
                .map(|authority| authority.as_str().to_string())
                .collect(),
        }
    }
}
