use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};
use std::{fmt, sync::Arc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{ClimateZone, GeoLocation, Nbs, NbsStatus, NbsSummary, NewNbs},
    responses::PageResponse,
};

pub const DEFAULT_PAGE_SIZE: u32 = 9;
pub const MAX_PAGE_SIZE: u32 = 100;

/// RepositoryError
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("unsupported sort field: {0}")]
    InvalidSort(String),

    /// A stored row could not be mapped back onto the model.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

// --- Paging & Sorting ---

/// SortField
///
/// The columns a listing may be ordered by. Anything else is rejected before a
/// query is built, so the column name pushed into SQL is always one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    DateCreated,
    Title,
    ClimateZone,
    Pilot,
}

impl SortField {
    pub fn parse(field: &str) -> Result<Self, RepositoryError> {
        match field.trim() {
            "dateCreated" => Ok(Self::DateCreated),
            "title" => Ok(Self::Title),
            "climateZone" => Ok(Self::ClimateZone),
            "pilot" => Ok(Self::Pilot),
            other => Err(RepositoryError::InvalidSort(other.to_string())),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::DateCreated => "date_created",
            Self::Title => "title",
            Self::ClimateZone => "climate_zone",
            Self::Pilot => "pilot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Anything other than `asc` (any case) sorts descending.
    pub fn parse(direction: &str) -> Self {
        if direction.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        })
    }
}

/// PageQuery
///
/// Raw listing query parameters, e.g. `?page=0&size=9&sort=dateCreated&direction=desc`.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Zero-based page index (default 0).
    pub page: Option<u32>,
    /// Page size (default 9, at most 100).
    pub size: Option<u32>,
    /// One of `dateCreated`, `title`, `climateZone`, `pilot`.
    pub sort: Option<String>,
    /// `asc` or `desc` (default).
    pub direction: Option<String>,
}

/// PageRequest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: SortField::default(),
            direction: SortDirection::default(),
        }
    }
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }
}

impl TryFrom<PageQuery> for PageRequest {
    type Error = RepositoryError;

    fn try_from(query: PageQuery) -> Result<Self, Self::Error> {
        let sort = match query.sort.as_deref() {
            Some(field) => SortField::parse(field)?,
            None => SortField::default(),
        };
        Ok(Self {
            page: query.page.unwrap_or(0),
            size: query.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            sort,
            direction: query
                .direction
                .as_deref()
                .map(SortDirection::parse)
                .unwrap_or_default(),
        })
    }
}

// --- Repository Contract ---

/// NbsRepository
///
/// Persistence contract for the catalog. Handlers only see this trait, so
/// tests swap the Postgres implementation for an in-memory one.
#[async_trait]
pub trait NbsRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Nbs, RepositoryError>;

    async fn find_by_title(&self, title: &str) -> Result<Nbs, RepositoryError>;

    /// Brief cards for one page, optionally restricted to a climate zone.
    async fn find_summaries(
        &self,
        zone: Option<ClimateZone>,
        page: PageRequest,
    ) -> Result<PageResponse<NbsSummary>, RepositoryError>;

    async fn find_geolocations(&self) -> Result<Vec<GeoLocation>, RepositoryError>;

    /// Inserts a new record; titles are unique.
    async fn create(&self, nbs: NewNbs) -> Result<Nbs, RepositoryError>;
}

/// RepositoryState
pub type RepositoryState = Arc<dyn NbsRepository>;

// --- Postgres Implementation ---

const NBS_COLUMNS: &str = "id, title, climate_zone, latitude, longitude, address, status, pilot, \
     is_urbreath_nbs, related_material, date_created, area_characterization, objective, \
     challenges, potential_impacts_and_benefits, lessons_learnt, keywords, problems, \
     main_image, images, videos, idra_datasets, kpis";

const SUMMARY_COLUMNS: &str = "id, title, climate_zone, pilot, main_image, latitude, longitude, \
     address, is_urbreath_nbs, keywords, objective";

const UNIQUE_VIOLATION: &str = "23505";

/// Flat row of the `nbs` table.
#[derive(Debug, FromRow)]
struct NbsRow {
    id: Uuid,
    title: String,
    climate_zone: String,
    latitude: f64,
    longitude: f64,
    address: Option<String>,
    status: String,
    pilot: String,
    is_urbreath_nbs: bool,
    related_material: Vec<String>,
    date_created: DateTime<Utc>,
    area_characterization: String,
    objective: String,
    challenges: String,
    potential_impacts_and_benefits: String,
    lessons_learnt: String,
    keywords: Vec<String>,
    problems: Vec<String>,
    main_image: String,
    images: Vec<String>,
    videos: Vec<String>,
    idra_datasets: Vec<String>,
    kpis: Vec<String>,
}

impl TryFrom<NbsRow> for Nbs {
    type Error = RepositoryError;

    fn try_from(row: NbsRow) -> Result<Self, Self::Error> {
        Ok(Nbs {
            id: row.id,
            title: row.title,
            climate_zone: parse_column(&row.climate_zone)?,
            geo_location: GeoLocation {
                latitude: row.latitude,
                longitude: row.longitude,
                address: row.address,
            },
            status: parse_column::<NbsStatus>(&row.status)?,
            pilot: row.pilot,
            is_urbreath_nbs: row.is_urbreath_nbs,
            related_material: row.related_material,
            date_created: row.date_created,
            area_characterization: row.area_characterization,
            objective: row.objective,
            challenges: row.challenges,
            potential_impacts_and_benefits: row.potential_impacts_and_benefits,
            lessons_learnt: row.lessons_learnt,
            keywords: row.keywords,
            problems: row.problems,
            main_image: row.main_image,
            images: row.images,
            videos: row.videos,
            idra_datasets: row.idra_datasets,
            kpis: row.kpis,
        })
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    id: Uuid,
    title: String,
    climate_zone: String,
    pilot: String,
    main_image: String,
    latitude: f64,
    longitude: f64,
    address: Option<String>,
    is_urbreath_nbs: bool,
    keywords: Vec<String>,
    objective: String,
}

impl TryFrom<SummaryRow> for NbsSummary {
    type Error = RepositoryError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(NbsSummary {
            id: row.id,
            title: row.title,
            climate_zone: parse_column(&row.climate_zone)?,
            pilot: row.pilot,
            main_image: row.main_image,
            geo_location: GeoLocation {
                latitude: row.latitude,
                longitude: row.longitude,
                address: row.address,
            },
            is_urbreath_nbs: row.is_urbreath_nbs,
            keywords: row.keywords,
            objective: row.objective,
        })
    }
}

#[derive(Debug, FromRow)]
struct GeoRow {
    latitude: f64,
    longitude: f64,
    address: Option<String>,
}

fn parse_column<T>(raw: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| RepositoryError::Corrupt(e.to_string()))
}

/// PostgresRepository
///
/// `NbsRepository` backed by Postgres. Queries are built at runtime with
/// bound parameters only; the sort column comes from `SortField`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NbsRepository for PostgresRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Nbs, RepositoryError> {
        let row = sqlx::query_as::<_, NbsRow>(&format!("SELECT {NBS_COLUMNS} FROM nbs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Nbs::try_from)
            .transpose()?
            .ok_or_else(|| RepositoryError::NotFound(format!("NBS with id: {id} not found in DB")))
    }

    async fn find_by_title(&self, title: &str) -> Result<Nbs, RepositoryError> {
        let row = sqlx::query_as::<_, NbsRow>(&format!("SELECT {NBS_COLUMNS} FROM nbs WHERE title = $1"))
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Nbs::try_from).transpose()?.ok_or_else(|| {
            RepositoryError::NotFound(format!("NBS with title: {title} not found in DB"))
        })
    }

    /// find_summaries
    ///
    /// One count query and one page query. A secondary order on `id` keeps
    /// pages stable when the sort column has ties.
    async fn find_summaries(
        &self,
        zone: Option<ClimateZone>,
        page: PageRequest,
    ) -> Result<PageResponse<NbsSummary>, RepositoryError> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM nbs");
        if let Some(zone) = zone {
            count.push(" WHERE climate_zone = ").push_bind(zone.name());
        }
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {SUMMARY_COLUMNS} FROM nbs"));
        if let Some(zone) = zone {
            select.push(" WHERE climate_zone = ").push_bind(zone.name());
        }
        select
            .push(format!(" ORDER BY {} {}, id ASC", page.sort.column(), page.direction))
            .push(" LIMIT ")
            .push_bind(i64::from(page.size))
            .push(" OFFSET ")
            .push_bind(page.offset());

        let summaries = select
            .build_query_as::<SummaryRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(NbsSummary::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let total = u64::try_from(total).unwrap_or_default();
        Ok(PageResponse::new(summaries, total, page.page, page.size))
    }

    async fn find_geolocations(&self) -> Result<Vec<GeoLocation>, RepositoryError> {
        let rows = sqlx::query_as::<_, GeoRow>(
            "SELECT latitude, longitude, address FROM nbs ORDER BY date_created DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| GeoLocation {
                latitude: row.latitude,
                longitude: row.longitude,
                address: row.address,
            })
            .collect())
    }

    /// create
    ///
    /// A unique-constraint violation on `title` surfaces as `Duplicate`.
    async fn create(&self, nbs: NewNbs) -> Result<Nbs, RepositoryError> {
        let title = nbs.title.clone();
        let record = nbs.into_nbs(Uuid::new_v4(), Utc::now());

        let inserted = sqlx::query_as::<_, NbsRow>(&format!(
            "INSERT INTO nbs ({NBS_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23) \
             RETURNING {NBS_COLUMNS}"
        ))
        .bind(record.id)
        .bind(&record.title)
        .bind(record.climate_zone.name())
        .bind(record.geo_location.latitude)
        .bind(record.geo_location.longitude)
        .bind(&record.geo_location.address)
        .bind(record.status.name())
        .bind(&record.pilot)
        .bind(record.is_urbreath_nbs)
        .bind(&record.related_material)
        .bind(record.date_created)
        .bind(&record.area_characterization)
        .bind(&record.objective)
        .bind(&record.challenges)
        .bind(&record.potential_impacts_and_benefits)
        .bind(&record.lessons_learnt)
        .bind(&record.keywords)
        .bind(&record.problems)
        .bind(&record.main_image)
        .bind(&record.images)
        .bind(&record.videos)
        .bind(&record.idra_datasets)
        .bind(&record.kpis)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .and_then(|db| db.code())
                .is_some_and(|code| code == UNIQUE_VIOLATION);
            if duplicate {
                RepositoryError::Duplicate(format!("NBS with title: {title} already exists"))
            } else {
                RepositoryError::Sqlx(e)
            }
        })?;

        Nbs::try_from(inserted)
    }
}
