// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use fleetview_app::validation::{parse_datetime_minutes, parse_required_date};
use fleetview_app::{
    BatteryReadingForm, ChangePasswordInput, IssueForm, IssueStatus, JobForm, JobPriority,
    JobStatus, LoginInput, RegistrationInput, Role, SessionUser, Severity, TripForm, TripStatus,
    VehicleForm,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::{Date, PrimitiveDateTime, Time};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Average road speed used to estimate trip duration when the backend only
/// reports distance.
const ASSUMED_SPEED_KMH: i64 = 50;

/// Deadline given to a service task that arrives without one.
const DEFAULT_SERVICE_WINDOW: time::Duration = time::Duration::hours(4);

/// The backend rejected the access token, or none was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionExpired;

impl fmt::Display for SessionExpired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("session expired or missing -- run `fleetview --login <email>` and retry")
    }
}

impl std::error::Error for SessionExpired {}

pub fn is_session_expired(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<SessionExpired>())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Session {
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    user: Option<SessionUser>,
}

/// Access and refresh tokens plus the signed-in user, optionally persisted
/// as JSON.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: Option<PathBuf>,
    session: Session,
}

impl TokenStore {
    pub fn memory() -> Self {
        Self {
            path: None,
            session: Session::default(),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let session = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("read token file {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| {
                format!(
                    "parse token file {} -- delete it and sign in again",
                    path.display()
                )
            })?
        } else {
            Session::default()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            session,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn access(&self) -> Option<&str> {
        self.session.access.as_deref()
    }

    pub fn refresh(&self) -> Option<&str> {
        self.session.refresh.as_deref()
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.session.user.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.access.is_some()
    }

    fn sign_in(&mut self, access: String, refresh: String, user: SessionUser) -> Result<()> {
        self.session = Session {
            access: Some(access),
            refresh: Some(refresh),
            user: Some(user),
        };
        self.save()
    }

    fn set_access(&mut self, access: String) -> Result<()> {
        self.session.access = Some(access);
        self.save()
    }

    fn set_user(&mut self, user: SessionUser) -> Result<()> {
        self.session.user = Some(user);
        self.save()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.session = Session::default();
        if let Some(path) = &self.path
            && path.exists()
        {
            fs::remove_file(path)
                .with_context(|| format!("remove token file {}", path.display()))?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create token directory {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(&self.session).context("encode token file")?;
        fs::write(path, body).with_context(|| format!("write token file {}", path.display()))?;
        set_private_permissions(path)
    }
}

#[derive(Debug)]
pub struct Client {
    base_url: Url,
    timeout: Duration,
    http: HttpClient,
    tokens: TokenStore,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration, tokens: TokenStore) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("api.base_url must not be empty");
        }
        // Url::join drops the last segment unless the base ends with '/'.
        let base_url = Url::parse(&format!("{trimmed}/"))
            .with_context(|| format!("api.base_url {trimmed:?} is not a valid URL"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {}://",
                base_url.scheme()
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn session_user(&self) -> Option<&SessionUser> {
        self.tokens.user()
    }

    pub fn login(&mut self, input: &LoginInput) -> Result<SessionUser> {
        input.validate()?;
        let request = self.http.post(self.endpoint("auth/login/")?).json(&LoginRequest {
            email: input.email.trim(),
            password: &input.password,
        });
        let response = self.send(request)?;

        let status = response.status();
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            warn!(email = %input.email.trim(), "login rejected");
            bail!("invalid email or password -- check your credentials and retry");
        }
        let parsed: LoginResponse = decode(response, "login response")?;

        let user = SessionUser {
            user_id: json_id(parsed.user_id.as_ref()),
            email: parsed.email.unwrap_or_else(|| input.email.trim().to_owned()),
            name: parsed.name.unwrap_or_default(),
            role: Role::route(parsed.role.as_deref().unwrap_or_default()),
        };
        self.tokens
            .sign_in(parsed.access, parsed.refresh, user.clone())?;
        debug!(path = ?self.tokens.path(), "stored session tokens");
        info!(email = %user.email, role = user.role.as_str(), "signed in");
        Ok(user)
    }

    /// Local tokens are dropped even when the server call fails; that
    /// failure is still returned.
    pub fn logout(&mut self) -> Result<()> {
        let Some(refresh) = self.tokens.refresh().map(str::to_owned) else {
            self.tokens.clear()?;
            return Ok(());
        };

        let outcome = self
            .endpoint("auth/logout/")
            .and_then(|url| {
                let request = self.http.post(url).json(&RefreshRequest { refresh: &refresh });
                self.send(request)
            })
            .and_then(expect_success)
            .map(|_| ());
        self.tokens.clear()?;

        match &outcome {
            Ok(()) => info!("signed out"),
            Err(error) => warn!(error = %error, "logout call failed; local tokens cleared"),
        }
        outcome
    }

    pub fn refresh(&mut self) -> Result<()> {
        let Some(refresh) = self.tokens.refresh().map(str::to_owned) else {
            bail!("not signed in -- run `fleetview --login <email>` first");
        };

        let request = self
            .http
            .post(self.endpoint("auth/refresh/")?)
            .json(&RefreshRequest { refresh: &refresh });
        let parsed: RefreshResponse = decode(self.send(request)?, "refresh response")?;
        self.tokens.set_access(parsed.access)?;
        debug!("refreshed access token");
        Ok(())
    }

    /// Runs `call`; if the backend rejects the access token, trades the
    /// refresh token for a new one and runs `call` once more.
    pub fn with_refresh<T>(&mut self, mut call: impl FnMut(&Self) -> Result<T>) -> Result<T> {
        match call(&*self) {
            Err(error) if is_session_expired(&error) && self.tokens.refresh().is_some() => {
                info!("access token rejected; refreshing session");
                self.refresh().context("refresh expired session")?;
                call(&*self)
            }
            outcome => outcome,
        }
    }

    /// Fetches the signed-in user and caches it in the token store.
    pub fn me(&mut self) -> Result<SessionUser> {
        let user = self.with_refresh(Self::fetch_user)?;
        self.tokens.set_user(user.clone())?;
        Ok(user)
    }

    fn fetch_user(&self) -> Result<SessionUser> {
        let request = self.http.get(self.endpoint("auth/me/")?);
        let envelope: Envelope<UserDto> = decode(self.send(request)?, "user details")?;
        Ok(envelope.into_data("user details")?.into_session_user())
    }

    pub fn register(&self, input: &RegistrationInput) -> Result<SessionUser> {
        input.validate()?;
        let request = self
            .http
            .post(self.endpoint("auth/register/")?)
            .json(&RegisterRequest {
                email: input.email.trim(),
                name: input.name.trim(),
                password: &input.password,
                password_confirm: &input.password_confirm,
                role: input.role.as_str(),
                performance: input.performance,
            });
        let envelope: Envelope<UserDto> = decode(self.send(request)?, "registration response")?;
        let user = envelope.into_data("registration")?.into_session_user();
        info!(email = %user.email, "registered account");
        Ok(user)
    }

    pub fn change_password(&mut self, input: &ChangePasswordInput) -> Result<()> {
        input.validate()?;
        self.with_refresh(|client| {
            let request = client
                .http
                .post(client.endpoint("auth/change-password/")?)
                .json(&ChangePasswordRequest {
                    old_password: &input.old_password,
                    new_password: &input.new_password,
                    new_password_confirm: &input.new_password_confirm,
                });
            expect_success(client.send(request)?).map(|_| ())
        })?;
        info!("changed password");
        Ok(())
    }

    pub fn fetch_trips(&self) -> Result<Vec<TripDto>> {
        let request = self.http.get(self.endpoint("get-trip-details/")?);
        let envelope: Envelope<Vec<TripDto>> = decode(self.send(request)?, "trip details")?;
        envelope.into_data("trip details")
    }

    pub fn fetch_issues(&self) -> Result<Vec<IssueDto>> {
        let request = self.http.get(self.endpoint("get-issue-details/")?);
        let envelope: Envelope<Vec<IssueDto>> = decode(self.send(request)?, "issue details")?;
        envelope.into_data("issue details")
    }

    /// Vehicles owned by the signed-in user with their battery history.
    pub fn fetch_vehicle_details(&self) -> Result<VehicleDetails> {
        let request = self.http.get(self.endpoint("get-vehicle-details/")?);
        let envelope: Envelope<VehicleDetails> =
            decode(self.send(request)?, "vehicle details")?;
        envelope.into_data("vehicle details")
    }

    pub fn fetch_charging_stats(&self) -> Result<Vec<VehicleStatsDto>> {
        let request = self.http.get(self.endpoint("get-charging-details/")?);
        let envelope: Envelope<ChargingDetails> =
            decode(self.send(request)?, "charging details")?;
        Ok(envelope.into_data("charging details")?.vehicle_stats)
    }

    /// Service tasks assigned to the signed-in technician.
    pub fn fetch_services(&self) -> Result<Vec<ServiceDto>> {
        let request = self.http.get(self.endpoint("get-service-details/")?);
        let envelope: Envelope<Vec<ServiceDto>> =
            decode(self.send(request)?, "service details")?;
        envelope.into_data("service details")
    }

    pub fn fetch_vehicle_owners(&self) -> Result<Vec<VehicleOwnerDto>> {
        let request = self.http.get(self.endpoint("get-user-details-by-vehicle/")?);
        let envelope: Envelope<Vec<VehicleOwnerDto>> =
            decode(self.send(request)?, "vehicle owners")?;
        envelope.into_data("vehicle owners")
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("build URL for {path}"))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match self.tokens.access() {
            Some(access) => request.bearer_auth(access),
            None => request,
        };
        request
            .send()
            .map_err(|error| connection_error(self.base_url(), error))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TripDto {
    pub trip_id: i64,
    #[serde(default)]
    pub vehicle_id: Option<serde_json::Value>,
    #[serde(default)]
    pub distance: i64,
    /// Kilometres per kWh.
    #[serde(default)]
    pub efficiency: i64,
    /// Whole rupees.
    #[serde(default)]
    pub running_cost: i64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub start_location: Option<String>,
    #[serde(default)]
    pub end_location: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl TripDto {
    pub fn code(&self) -> String {
        format!("R-TRIP{:03}", self.trip_id)
    }

    /// Converts to a store input keyed on `code()`. Missing dates fall back
    /// to `today`; a missing duration is estimated from the distance.
    pub fn into_trip_form(self, today: Date) -> Result<TripForm> {
        let code = self.code();
        let vehicle = self
            .vehicle_id
            .as_ref()
            .map(json_text)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "unknown".to_owned());
        let trip_date = match self.date.as_deref() {
            Some(raw) => backend_date(raw).with_context(|| format!("trip {code} date"))?,
            None => today,
        };
        let duration_minutes = self
            .duration_minutes
            .filter(|minutes| *minutes > 0)
            .unwrap_or_else(|| (self.distance * 60 / ASSUMED_SPEED_KMH).max(1));
        let energy_kwh = if self.efficiency > 0 {
            self.distance / self.efficiency
        } else {
            0
        };
        let status = match self.status.as_deref() {
            Some(raw) => TripStatus::parse(raw)
                .ok_or_else(|| anyhow!("trip {code} has unknown status {raw:?}"))?,
            None => TripStatus::Completed,
        };

        Ok(TripForm {
            code,
            trip_date,
            start_location: self
                .start_location
                .unwrap_or_else(|| format!("Vehicle {vehicle}")),
            end_location: self.end_location.unwrap_or_else(|| "unknown".to_owned()),
            distance_km: self.distance.max(0),
            duration_minutes,
            energy_kwh: energy_kwh.max(0),
            cost_paise: self.running_cost.max(0).saturating_mul(100),
            status,
            notes: format!("synced from backend (vehicle {vehicle})"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IssueDto {
    pub issue_id: i64,
    #[serde(default)]
    pub vehicle_id: Option<serde_json::Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date_reported: Option<String>,
    #[serde(default)]
    pub date_completed: Option<String>,
    #[serde(default, rename = "assigned_to__email")]
    pub assigned_to_email: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub is_resolved: bool,
    /// Whole rupees.
    #[serde(default)]
    pub cost: Option<f64>,
}

impl IssueDto {
    pub fn code(&self) -> String {
        format!("R-ISS-{:03}", self.issue_id)
    }

    pub fn into_issue_form(self, today: Date) -> Result<IssueForm> {
        let code = self.code();
        let reported_on = match self.date_reported.as_deref() {
            Some(raw) => backend_date(raw).with_context(|| format!("issue {code} date"))?,
            None => today,
        };
        let severity = match self.priority.as_deref() {
            Some(raw) => Severity::parse(raw)
                .ok_or_else(|| anyhow!("issue {code} has unknown priority {raw:?}"))?,
            None => Severity::Low,
        };
        let status = if self.is_resolved || self.date_completed.is_some() {
            IssueStatus::Resolved
        } else if self.assigned_to_email.is_some() {
            IssueStatus::InProgress
        } else {
            IssueStatus::Open
        };
        let description = if self.description.trim().is_empty() {
            self.title.clone().unwrap_or_default()
        } else {
            self.description
        };

        Ok(IssueForm {
            vehicle_no: self
                .vehicle_id
                .as_ref()
                .map(json_text)
                .unwrap_or_default(),
            error_code: String::new(),
            category: self.category.or(self.title).unwrap_or_default(),
            description,
            reported_on,
            severity,
            status,
            assignee: self.assigned_to_email.unwrap_or_default(),
            cost_paise: self.cost.map(|rupees| (rupees * 100.0).round() as i64),
            notes: String::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleDetails {
    #[serde(default, rename = "vehicle")]
    pub vehicles: Vec<VehicleDto>,
    #[serde(default)]
    pub vehicle_stats: Vec<VehicleStatsDto>,
}

#[derive(Debug, Deserialize)]
struct ChargingDetails {
    #[serde(default)]
    vehicle_stats: Vec<VehicleStatsDto>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleDto {
    pub vehicle_id: i64,
    #[serde(default)]
    pub vehicle_model: String,
    #[serde(default)]
    pub vehicle_colour: String,
    #[serde(default)]
    pub registration_number: String,
}

pub fn vehicle_code(vehicle_id: i64) -> String {
    format!("R-VEH{vehicle_id:03}")
}

impl VehicleDto {
    pub fn code(&self) -> String {
        vehicle_code(self.vehicle_id)
    }

    /// `owners` is the vehicle-owner listing, matched on registration
    /// number; an unmatched vehicle keeps a blank owner.
    pub fn into_vehicle_form(self, owners: &[VehicleOwnerDto]) -> Result<VehicleForm> {
        let code = self.code();
        let registration_no = self.registration_number.trim().to_owned();
        if registration_no.is_empty() {
            bail!("vehicle {code} has no registration number");
        }
        let owner = owners
            .iter()
            .find(|owner| owner.registration_number.trim() == registration_no)
            .and_then(VehicleOwnerDto::label)
            .unwrap_or_default();

        Ok(VehicleForm {
            code,
            registration_no,
            model: self.vehicle_model.trim().to_owned(),
            colour: self.vehicle_colour.trim().to_owned(),
            owner,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleStatsDto {
    pub stats_id: i64,
    #[serde(alias = "vehicle")]
    pub vehicle_id: i64,
    #[serde(default)]
    pub battery_percentage: i64,
    #[serde(default)]
    pub battery_health: i64,
    /// Degrees Celsius.
    #[serde(default)]
    pub temperature: i64,
    /// kWh.
    #[serde(default)]
    pub battery_capacity: i64,
    /// Kilometres.
    #[serde(default)]
    pub estimated_range: i64,
    #[serde(default)]
    pub recorded_at: Option<String>,
}

impl VehicleStatsDto {
    pub fn code(&self) -> String {
        format!("R-STAT{:03}", self.stats_id)
    }

    pub fn into_reading_form(self, now: PrimitiveDateTime) -> Result<BatteryReadingForm> {
        let code = self.code();
        let recorded_at = match self.recorded_at.as_deref() {
            Some(raw) => backend_datetime(raw).with_context(|| format!("reading {code} time"))?,
            None => now,
        };
        Ok(BatteryReadingForm {
            code,
            vehicle_code: vehicle_code(self.vehicle_id),
            charge_percent: self.battery_percentage,
            health_percent: self.battery_health,
            temperature_c: self.temperature,
            capacity_kwh: self.battery_capacity,
            range_km: self.estimated_range,
            recorded_at,
        })
    }
}

/// Merges stats from the vehicle and charging listings, keeping one entry
/// per `stats_id`. Later duplicates replace earlier ones.
pub fn merge_vehicle_stats(
    listings: impl IntoIterator<Item = Vec<VehicleStatsDto>>,
) -> Vec<VehicleStatsDto> {
    let mut merged = BTreeMap::new();
    for stats in listings {
        for stat in stats {
            merged.insert(stat.stats_id, stat);
        }
    }
    merged.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleOwnerDto {
    #[serde(default, rename = "owner__username")]
    pub owner_username: Option<String>,
    #[serde(default, rename = "owner__email")]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub registration_number: String,
    #[serde(default)]
    pub vehicle_model: String,
}

impl VehicleOwnerDto {
    /// Prefers the username, falling back to the email.
    pub fn label(&self) -> Option<String> {
        [&self.owner_username, &self.owner_email]
            .into_iter()
            .flatten()
            .map(|text| text.trim())
            .find(|text| !text.is_empty())
            .map(str::to_owned)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceDto {
    pub service_id: i64,
    #[serde(default, alias = "vehicle")]
    pub vehicle_id: Option<serde_json::Value>,
    #[serde(default, rename = "serviceman__email")]
    pub serviceman_email: Option<String>,
    #[serde(default, rename = "assigned_to__email")]
    pub assigned_to_email: Option<String>,
    #[serde(default, alias = "actual_service_date")]
    pub start_time: Option<String>,
    #[serde(default, alias = "completion_date")]
    pub deadline: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ServiceDto {
    pub fn code(&self) -> String {
        format!("R-SVC{:03}", self.service_id)
    }

    /// A missing start falls back to `now`, a missing deadline to four
    /// hours after the start. A date-only deadline means the end of that day.
    pub fn into_job_form(self, now: PrimitiveDateTime) -> Result<JobForm> {
        let code = self.code();
        let assignee = [self.assigned_to_email, self.serviceman_email]
            .into_iter()
            .flatten()
            .map(|email| email.trim().to_owned())
            .find(|email| !email.is_empty())
            .ok_or_else(|| anyhow!("service {code} has no assigned technician"))?;
        let starts_at = match self.start_time.as_deref() {
            Some(raw) => backend_datetime(raw).with_context(|| format!("service {code} start"))?,
            None => now,
        };
        let deadline = match self.deadline.as_deref() {
            Some(raw) => {
                backend_deadline(raw).with_context(|| format!("service {code} deadline"))?
            }
            None => starts_at + DEFAULT_SERVICE_WINDOW,
        };
        let priority = match self.priority.as_deref() {
            Some(raw) => service_priority(raw)
                .ok_or_else(|| anyhow!("service {code} has unknown priority {raw:?}"))?,
            None => JobPriority::Normal,
        };
        let status = match self.status.as_deref() {
            Some(raw) => service_status(raw)
                .ok_or_else(|| anyhow!("service {code} has unknown status {raw:?}"))?,
            None => JobStatus::Assigned,
        };
        let vehicle = self
            .vehicle_id
            .as_ref()
            .map(json_text)
            .filter(|text| !text.is_empty());
        let task = match (self.notes.map(|notes| notes.trim().to_owned()), vehicle) {
            (Some(notes), _) if !notes.is_empty() => notes,
            (_, Some(vehicle)) => format!("Service vehicle {vehicle}"),
            _ => format!("Service {code}"),
        };

        Ok(JobForm {
            task,
            assignee,
            starts_at,
            deadline,
            priority,
            status,
        })
    }
}

/// The backend grades work LOW / MEDIUM / HIGH; only HIGH and above stand
/// out on the jobs board.
fn service_priority(raw: &str) -> Option<JobPriority> {
    JobPriority::parse(raw).or_else(|| {
        matches!(raw.trim().to_ascii_lowercase().as_str(), "low" | "medium")
            .then_some(JobPriority::Normal)
    })
}

fn service_status(raw: &str) -> Option<JobStatus> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "PENDING" => Some(JobStatus::Assigned),
        "ONGOING" => Some(JobStatus::InProgress),
        "COMPLETED" => Some(JobStatus::Completed),
        _ => JobStatus::parse(raw),
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    name: &'a str,
    password: &'a str,
    password_confirm: &'a str,
    role: &'a str,
    performance: u8,
}

#[derive(Debug, Serialize)]
struct ChangePasswordRequest<'a> {
    old_password: &'a str,
    new_password: &'a str,
    new_password_confirm: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
    #[serde(default)]
    user_id: Option<serde_json::Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    #[serde(default, alias = "id")]
    user_id: Option<serde_json::Value>,
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    role: String,
}

impl UserDto {
    fn into_session_user(self) -> SessionUser {
        SessionUser {
            user_id: json_id(self.user_id.as_ref()),
            email: self.email,
            name: self.name,
            role: Role::route(&self.role),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, what: &str) -> Result<T> {
        if !self.success {
            if self.message.is_empty() {
                bail!("backend reported a failure fetching {what}");
            }
            bail!("backend reported a failure fetching {what}: {}", self.message);
        }
        self.data
            .ok_or_else(|| anyhow!("backend response for {what} has no data"))
    }
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct BackendErrorEnvelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let response = expect_success(response)?;
    response.json().with_context(|| format!("decode {what}"))
}

fn expect_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(SessionExpired.into());
    }
    let body = response.text().unwrap_or_default();
    Err(clean_error_response(status, &body))
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot connect to server at {} -- check api.base_url and that the backend is running ({})",
        base_url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<BackendErrorEnvelope>(body) {
        if let Some(message) = parsed.message
            && !message.is_empty()
        {
            return anyhow!("server error ({}): {}", status.as_u16(), message);
        }
        if let Some(detail) = parsed.detail
            && !detail.is_empty()
        {
            return anyhow!("server error ({}): {}", status.as_u16(), detail);
        }
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

fn json_id(value: Option<&serde_json::Value>) -> i64 {
    match value {
        Some(serde_json::Value::Number(number)) => number.as_i64().unwrap_or(0),
        Some(serde_json::Value::String(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.trim().to_owned(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Accepts `YYYY-MM-DD` or an ISO timestamp whose first ten characters are
/// the date.
fn backend_date(raw: &str) -> Result<Date> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    parse_required_date(day).map_err(|error| anyhow!("{error} {raw:?}"))
}

/// Accepts `YYYY-MM-DD HH:MM`, an ISO timestamp (seconds and zone are
/// dropped), or a bare date meaning its midnight.
fn backend_datetime(raw: &str) -> Result<PrimitiveDateTime> {
    let raw = raw.trim();
    if raw.len() == 10 {
        return Ok(backend_date(raw)?.midnight());
    }
    let minutes = raw.get(..16).unwrap_or(raw).replacen('T', " ", 1);
    parse_datetime_minutes(&minutes).map_err(|error| anyhow!("{error} {raw:?}"))
}

/// Like `backend_datetime`, but a bare date runs to the end of that day.
fn backend_deadline(raw: &str) -> Result<PrimitiveDateTime> {
    let raw = raw.trim();
    if raw.len() == 10 {
        return Ok(backend_date(raw)?.with_time(Time::from_hms(23, 59, 0)?));
    }
    backend_datetime(raw)
}

fn set_private_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("set permissions on {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        IssueDto, ServiceDto, Session, SessionExpired, TokenStore, TripDto, VehicleDto,
        VehicleOwnerDto, VehicleStatsDto, backend_date, backend_datetime, clean_error_response,
        is_session_expired, json_id, merge_vehicle_stats,
    };
    use anyhow::Result;
    use fleetview_app::{IssueStatus, JobPriority, JobStatus, Role, SessionUser, Severity, TripStatus};
    use reqwest::StatusCode;
    use serde_json::json;
    use time::macros::{date, datetime};

    #[test]
    fn clean_error_prefers_message_then_detail() {
        let error = clean_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"success":false,"message":"An error occurred while fetching trip details.","icon":"error"}"#,
        );
        assert_eq!(
            error.to_string(),
            "server error (500): An error occurred while fetching trip details."
        );

        let error = clean_error_response(
            StatusCode::FORBIDDEN,
            r#"{"detail":"You do not have permission to perform this action."}"#,
        );
        assert_eq!(
            error.to_string(),
            "server error (403): You do not have permission to perform this action."
        );

        let error = clean_error_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(error.to_string(), "server error (502): upstream down");

        let error = clean_error_response(StatusCode::BAD_REQUEST, r#"{"errors":{"email":[]}}"#);
        assert_eq!(error.to_string(), "server returned 400");
    }

    #[test]
    fn ids_accept_numbers_and_strings() {
        assert_eq!(json_id(Some(&json!(42))), 42);
        assert_eq!(json_id(Some(&json!(" 7 "))), 7);
        assert_eq!(json_id(Some(&json!("abc"))), 0);
        assert_eq!(json_id(None), 0);
    }

    #[test]
    fn backend_dates_strip_time_component() -> Result<()> {
        assert_eq!(backend_date("2026-01-10")?, date!(2026 - 01 - 10));
        assert_eq!(
            backend_date("2026-01-10T08:15:00.123Z")?,
            date!(2026 - 01 - 10)
        );
        assert!(backend_date("10/01/2026").is_err());
        Ok(())
    }

    #[test]
    fn backend_datetimes_keep_minutes() -> Result<()> {
        assert_eq!(
            backend_datetime("2026-01-23T09:15:42.5+05:30")?,
            datetime!(2026-01-23 09:15)
        );
        assert_eq!(backend_datetime("2026-01-23 17:00")?, datetime!(2026-01-23 17:00));
        assert_eq!(backend_datetime("2026-01-23")?, datetime!(2026-01-23 00:00));
        assert!(backend_datetime("yesterday").is_err());
        Ok(())
    }

    #[test]
    fn session_expiry_survives_context() {
        let error = anyhow::Error::new(SessionExpired);
        assert!(is_session_expired(&error));
        let wrapped = error.context("fetch trips");
        assert!(is_session_expired(&wrapped));
        assert!(!is_session_expired(&anyhow::anyhow!("server returned 500")));
    }

    #[test]
    fn vehicle_dto_takes_owner_from_listing() -> Result<()> {
        let dto: VehicleDto = serde_json::from_value(json!({
            "vehicle_id": 3,
            "vehicle_model": "Tata Nexon EV ",
            "vehicle_colour": "White",
            "registration_number": "TN09AB1234"
        }))?;
        assert_eq!(dto.code(), "R-VEH003");

        let owners: Vec<VehicleOwnerDto> = serde_json::from_value(json!([
            {"owner__id": 9, "owner__username": "", "owner__email": "rahul@example.com",
             "vehicle_model": "Tata Nexon EV", "registration_number": "TN09AB1234"},
            {"owner__id": 9, "owner__username": "meera", "registration_number": "KL07QR6655"}
        ]))?;
        let form = dto.clone().into_vehicle_form(&owners)?;
        assert_eq!(form.code, "R-VEH003");
        assert_eq!(form.model, "Tata Nexon EV");
        assert_eq!(form.owner, "rahul@example.com");
        form.validate()?;

        assert_eq!(dto.into_vehicle_form(&[])?.owner, "");
        assert_eq!(owners[1].label().as_deref(), Some("meera"));

        let unregistered: VehicleDto = serde_json::from_value(json!({"vehicle_id": 4}))?;
        assert!(unregistered.into_vehicle_form(&owners).is_err());
        Ok(())
    }

    #[test]
    fn vehicle_stats_merge_by_id_and_convert() -> Result<()> {
        let details: Vec<VehicleStatsDto> = serde_json::from_value(json!([
            {"stats_id": 2, "vehicle": 3, "battery_percentage": 40, "battery_health": 90,
             "temperature": 31, "battery_capacity": 40, "estimated_range": 150,
             "recorded_at": "2026-01-23T08:00:00Z"},
            {"stats_id": 1, "vehicle_id": 3, "battery_percentage": 80}
        ]))?;
        let charging: Vec<VehicleStatsDto> = serde_json::from_value(json!([
            {"stats_id": 2, "vehicle_id": 3, "battery_percentage": 45, "battery_health": 90,
             "temperature": 30, "battery_capacity": 40, "estimated_range": 170,
             "recorded_at": "2026-01-23T08:30:00Z"}
        ]))?;

        let merged = merge_vehicle_stats([details, charging]);
        assert_eq!(
            merged.iter().map(|stat| stat.stats_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(merged[1].battery_percentage, 45);

        let form = merged[1].clone().into_reading_form(datetime!(2026-01-23 12:00))?;
        assert_eq!(form.code, "R-STAT002");
        assert_eq!(form.vehicle_code, "R-VEH003");
        assert_eq!(form.recorded_at, datetime!(2026-01-23 08:30));
        form.validate()?;

        let undated = merged[0].clone().into_reading_form(datetime!(2026-01-23 12:00))?;
        assert_eq!(undated.recorded_at, datetime!(2026-01-23 12:00));
        Ok(())
    }

    #[test]
    fn service_dto_becomes_job() -> Result<()> {
        let dto: ServiceDto = serde_json::from_value(json!({
            "service_id": 4,
            "vehicle_id": 3,
            "serviceman__email": "tech@example.com",
            "start_time": "2026-01-23T13:00:00Z",
            "deadline": "2026-01-23",
            "priority": "MEDIUM",
            "status": "ONGOING",
            "notes": "  ",
            "rating": 4
        }))?;
        assert_eq!(dto.code(), "R-SVC004");

        let job = dto.into_job_form(datetime!(2026-01-23 09:00))?;
        assert_eq!(job.task, "Service vehicle 3");
        assert_eq!(job.assignee, "tech@example.com");
        assert_eq!(job.starts_at, datetime!(2026-01-23 13:00));
        assert_eq!(job.deadline, datetime!(2026-01-23 23:59));
        assert_eq!(job.priority, JobPriority::Normal);
        assert_eq!(job.status, JobStatus::InProgress);
        job.validate()?;

        let bare: ServiceDto = serde_json::from_value(json!({
            "service_id": 5,
            "assigned_to__email": "lead@example.com",
            "serviceman__email": "tech@example.com",
            "priority": "HIGH",
            "status": "PENDING",
            "notes": "Replace coolant pump"
        }))?;
        let job = bare.into_job_form(datetime!(2026-01-23 09:00))?;
        assert_eq!(job.assignee, "lead@example.com");
        assert_eq!(job.task, "Replace coolant pump");
        assert_eq!(job.deadline, datetime!(2026-01-23 13:00));
        assert_eq!(job.priority, JobPriority::High);
        assert_eq!(job.status, JobStatus::Assigned);

        let unassigned: ServiceDto = serde_json::from_value(json!({"service_id": 6}))?;
        let error = unassigned
            .into_job_form(datetime!(2026-01-23 09:00))
            .expect_err("no technician");
        assert!(error.to_string().contains("R-SVC006"), "{error}");

        let odd: ServiceDto = serde_json::from_value(json!({
            "service_id": 7,
            "serviceman__email": "tech@example.com",
            "status": "PAUSED"
        }))?;
        assert!(odd.into_job_form(datetime!(2026-01-23 09:00)).is_err());
        Ok(())
    }

    #[test]
    fn trip_dto_fills_missing_fields() -> Result<()> {
        let dto: TripDto = serde_json::from_value(json!({
            "trip_id": 4,
            "vehicle_id": 12,
            "distance": 150,
            "efficiency": 6,
            "running_cost": 900
        }))?;
        assert_eq!(dto.code(), "R-TRIP004");

        let form = dto.into_trip_form(date!(2026 - 01 - 23))?;
        assert_eq!(form.code, "R-TRIP004");
        assert_eq!(form.trip_date, date!(2026 - 01 - 23));
        assert_eq!(form.start_location, "Vehicle 12");
        assert_eq!(form.duration_minutes, 180);
        assert_eq!(form.energy_kwh, 25);
        assert_eq!(form.cost_paise, 90_000);
        assert_eq!(form.status, TripStatus::Completed);
        form.validate()?;
        Ok(())
    }

    #[test]
    fn trip_dto_rejects_unknown_status() -> Result<()> {
        let dto: TripDto = serde_json::from_value(json!({
            "trip_id": 1,
            "distance": 10,
            "status": "teleported"
        }))?;
        assert!(dto.into_trip_form(date!(2026 - 01 - 23)).is_err());
        Ok(())
    }

    #[test]
    fn issue_dto_maps_resolution_and_priority() -> Result<()> {
        let dto: IssueDto = serde_json::from_value(json!({
            "issue_id": 9,
            "vehicle_id": "EV-1023",
            "category": "Battery",
            "description": "Cell imbalance",
            "date_reported": "2026-01-10T10:00:00Z",
            "date_completed": null,
            "assigned_to__email": "tech@example.com",
            "priority": "HIGH",
            "is_resolved": false,
            "cost": 1250.5
        }))?;
        assert_eq!(dto.code(), "R-ISS-009");

        let form = dto.into_issue_form(date!(2026 - 01 - 23))?;
        assert_eq!(form.vehicle_no, "EV-1023");
        assert_eq!(form.severity, Severity::High);
        assert_eq!(form.status, IssueStatus::InProgress);
        assert_eq!(form.reported_on, date!(2026 - 01 - 10));
        assert_eq!(form.cost_paise, Some(125_050));
        form.validate()?;

        let resolved: IssueDto = serde_json::from_value(json!({
            "issue_id": 10,
            "vehicle_id": 3,
            "title": "Brake noise",
            "is_resolved": true
        }))?;
        let form = resolved.into_issue_form(date!(2026 - 01 - 23))?;
        assert_eq!(form.status, IssueStatus::Resolved);
        assert_eq!(form.description, "Brake noise");
        assert_eq!(form.vehicle_no, "3");
        Ok(())
    }

    #[test]
    fn token_store_round_trips_through_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("tokens.json");

        let mut store = TokenStore::open(&path)?;
        assert!(!store.is_signed_in());
        store.sign_in(
            "access-1".to_owned(),
            "refresh-1".to_owned(),
            SessionUser {
                user_id: 5,
                email: "owner@example.com".to_owned(),
                name: "Owner".to_owned(),
                role: Role::Personal,
            },
        )?;

        let reopened = TokenStore::open(&path)?;
        assert_eq!(reopened.access(), Some("access-1"));
        assert_eq!(reopened.refresh(), Some("refresh-1"));
        assert_eq!(reopened.user().map(|user| user.user_id), Some(5));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path)?.permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        store.clear()?;
        assert!(!path.exists());
        assert_eq!(store.session, Session::default());
        Ok(())
    }

    #[test]
    fn corrupt_token_file_has_remediation() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "not json")?;

        let error = TokenStore::open(&path).expect_err("corrupt file should fail");
        assert!(format!("{error:#}").contains("delete it and sign in again"));
        Ok(())
    }
}
