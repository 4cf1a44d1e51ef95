// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use fleetview_app::validation::{format_datetime_minutes, parse_datetime_minutes};
use fleetview_app::{
    BillItem, BillItemForm, BillItemId, BillSummary, FleetSummary, HelpArticle, HelpArticleId,
    BatteryReading, BatteryReadingForm, Invoice, InvoiceForm, InvoiceId, InvoiceStatus, IssueForm,
    IssueId, IssueStatus, Job, JobForm, JobId, JobPriority, JobStatus, Notification,
    NotificationId, Product, ProductId, ProfileForm, Role, SessionUser, Severity, SlaStatus,
    SupportTicket, SupportTicketForm, SupportTicketId, Trip, TripForm, TripId, TripStatus,
    UserProfile, Vehicle, VehicleForm, VehicleId, VehicleIssue, invoice_number, invoice_sequence,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use tracing::{debug, info};

pub const APP_NAME: &str = "fleetview";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "trips",
        &[
            "id",
            "code",
            "trip_date",
            "start_location",
            "end_location",
            "distance_km",
            "duration_minutes",
            "avg_speed_kmh",
            "energy_kwh",
            "cost_paise",
            "status",
            "notes",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "vehicle_issues",
        &[
            "id",
            "code",
            "vehicle_no",
            "error_code",
            "category",
            "description",
            "reported_on",
            "resolved_on",
            "severity",
            "status",
            "assignee",
            "cost_paise",
            "notes",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "invoices",
        &[
            "id",
            "number",
            "vehicle_no",
            "customer",
            "service",
            "issued_on",
            "amount_paise",
            "status",
            "created_at",
        ],
    ),
    (
        "jobs",
        &[
            "id",
            "code",
            "task",
            "assignee",
            "starts_at",
            "deadline",
            "priority",
            "status",
            "created_at",
        ],
    ),
    (
        "bill_items",
        &[
            "id",
            "name",
            "quantity",
            "rate_paise",
            "tax_percent",
            "created_at",
        ],
    ),
    ("products", &["id", "name", "price_paise"]),
    ("help_articles", &["id", "title", "body"]),
    (
        "support_tickets",
        &["id", "name", "email", "subject", "message", "created_at"],
    ),
    (
        "notifications",
        &["id", "message", "severity", "created_at", "dismissed_at"],
    ),
    (
        "user_profile",
        &[
            "id",
            "name",
            "role",
            "email",
            "phone",
            "username",
            "created_on",
            "last_login",
            "active",
            "bio",
            "updated_at",
        ],
    ),
];

/// Tables added after the first release; `sql/vehicles.sql` creates them on
/// older databases during bootstrap.
const VEHICLE_SCHEMA: &[(&str, &[&str])] = &[
    (
        "vehicles",
        &[
            "id",
            "code",
            "registration_no",
            "model",
            "colour",
            "owner",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "battery_readings",
        &[
            "id",
            "code",
            "vehicle_id",
            "charge_percent",
            "health_percent",
            "temperature_c",
            "capacity_kwh",
            "range_km",
            "recorded_at",
            "created_at",
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_trips_code",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_trips_code ON trips (code);",
    },
    RequiredIndex {
        name: "idx_vehicle_issues_code",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_vehicle_issues_code ON vehicle_issues (code);",
    },
    RequiredIndex {
        name: "idx_vehicle_issues_status",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_vehicle_issues_status ON vehicle_issues (status);",
    },
    RequiredIndex {
        name: "idx_invoices_number",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_invoices_number ON invoices (number);",
    },
    RequiredIndex {
        name: "idx_jobs_code",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_code ON jobs (code);",
    },
    RequiredIndex {
        name: "idx_vehicles_code",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_vehicles_code ON vehicles (code);",
    },
    RequiredIndex {
        name: "idx_battery_readings_code",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_battery_readings_code ON battery_readings (code);",
    },
    RequiredIndex {
        name: "idx_battery_readings_vehicle",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_battery_readings_vehicle ON battery_readings (vehicle_id, recorded_at);",
    },
    RequiredIndex {
        name: "idx_products_name",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_products_name ON products (name);",
    },
    RequiredIndex {
        name: "idx_help_articles_title",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_help_articles_title ON help_articles (title);",
    },
    RequiredIndex {
        name: "idx_notifications_dismissed_at",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_notifications_dismissed_at ON notifications (dismissed_at);",
    },
];

const DEFAULT_PRODUCTS: [(&str, i64); 3] = [
    ("Engine Service", 150_000),
    ("Oil Change", 80_000),
    ("Trip Charge", 200_000),
];

const DEFAULT_HELP_ARTICLES: [(&str, &str); 12] = [
    (
        "How to monitor EV battery health?",
        "Open the issues screen and filter by Battery to see BMS faults. High severity battery alerts also appear under notifications.",
    ),
    (
        "Managing charging stations",
        "Station faults are raised as notifications. Dismiss them once the station is back online.",
    ),
    (
        "Understanding alerts & notifications",
        "Alerts are graded Low, Medium or High. High alerts need attention the same day.",
    ),
    (
        "How to reset user password?",
        "Sign in and use the change password option, or ask an admin to reset the account.",
    ),
    (
        "Trouble uploading vehicle logs",
        "Check that the backend is reachable and run a sync. Failed uploads are listed in the log file.",
    ),
    (
        "Download EV performance reports",
        "Trip history with distance, duration and energy use is on the trips screen.",
    ),
    (
        "System not updating live data",
        "Press R to sync with the backend. If the server is unreachable the status line says so.",
    ),
    (
        "Managing user roles & access",
        "Admins see every screen. Personal users see trips and invoices; service users see jobs and billing.",
    ),
    (
        "Payment & subscription issues",
        "Pending invoices are listed on the invoices screen. Mark an invoice paid from its action menu.",
    ),
    (
        "Connecting IoT device to dashboard",
        "Devices report through the backend API. Configure the API base URL in the config file.",
    ),
    (
        "Firmware update process",
        "Firmware notices arrive as Medium alerts. Schedule the update as a service job.",
    ),
    (
        "Troubleshooting battery overheating",
        "Stop the vehicle, log a High severity battery issue and assign a technician.",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        if path.exists() {
            set_private_permissions(path)?;
        }
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn, REQUIRED_SCHEMA)?;
            debug!("validated existing schema");
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
            debug!("created schema");
        }

        self.conn
            .execute_batch(include_str!("sql/vehicles.sql"))
            .context("create vehicle tables")?;
        validate_schema(&self.conn, VEHICLE_SCHEMA)?;

        ensure_required_indexes(&self.conn)?;

        self.seed_defaults()?;
        Ok(())
    }

    pub fn seed_defaults(&self) -> Result<()> {
        for (name, price_paise) in DEFAULT_PRODUCTS {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO products (name, price_paise) VALUES (?, ?)",
                    params![name, price_paise],
                )
                .with_context(|| format!("insert default product {name}"))?;
        }

        for (title, body) in DEFAULT_HELP_ARTICLES {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO help_articles (title, body) VALUES (?, ?)",
                    params![title, body],
                )
                .with_context(|| format!("insert help article {title}"))?;
        }
        Ok(())
    }

    /// Loads the sample fleet: trips, issues, invoices, the day's jobs,
    /// vehicles with battery readings, notifications and the admin profile.
    /// Jobs and readings are placed on `today`.
    pub fn seed_demo_data(&self, today: Date) -> Result<()> {
        let now = now_rfc3339()?;

        for (code, date, from, to, km, minutes, speed, kwh, rupees, status, notes) in DEMO_TRIPS {
            self.conn
                .execute(
                    "
                    INSERT OR IGNORE INTO trips (
                      code, trip_date, start_location, end_location, distance_km,
                      duration_minutes, avg_speed_kmh, energy_kwh, cost_paise, status,
                      notes, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                    params![
                        code,
                        date,
                        from,
                        to,
                        km,
                        minutes,
                        speed,
                        kwh,
                        rupees * 100,
                        status.as_str(),
                        notes,
                        now,
                        now,
                    ],
                )
                .with_context(|| format!("insert demo trip {code}"))?;
        }

        for (code, vehicle, error_code, category, description, date, severity, status) in
            DEMO_ISSUES
        {
            let resolved_on = (status == IssueStatus::Resolved).then_some(date);
            self.conn
                .execute(
                    "
                    INSERT OR IGNORE INTO vehicle_issues (
                      code, vehicle_no, error_code, category, description, reported_on,
                      resolved_on, severity, status, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                    params![
                        code,
                        vehicle,
                        error_code,
                        category,
                        description,
                        date,
                        resolved_on,
                        severity.as_str(),
                        status.as_str(),
                        now,
                        now,
                    ],
                )
                .with_context(|| format!("insert demo issue {code}"))?;
        }

        for (sequence, vehicle, customer, service, rupees, status, date) in DEMO_INVOICES {
            let number = invoice_number(sequence);
            self.conn
                .execute(
                    "
                    INSERT OR IGNORE INTO invoices (
                      number, vehicle_no, customer, service, issued_on, amount_paise,
                      status, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                    params![
                        number,
                        vehicle,
                        customer,
                        service,
                        date,
                        rupees * 100,
                        status.as_str(),
                        now,
                    ],
                )
                .with_context(|| format!("insert demo invoice {number}"))?;
        }

        for (code, task, assignee, start_hour, deadline_hour, priority, status) in DEMO_JOBS {
            let starts_at = at_hour(today, start_hour)?;
            let deadline = at_hour(today, deadline_hour)?;
            self.conn
                .execute(
                    "
                    INSERT OR IGNORE INTO jobs (
                      code, task, assignee, starts_at, deadline, priority, status, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                    params![
                        code,
                        task,
                        assignee,
                        format_datetime_minutes(starts_at),
                        format_datetime_minutes(deadline),
                        priority.as_str(),
                        status.as_str(),
                        now,
                    ],
                )
                .with_context(|| format!("insert demo job {code}"))?;
        }

        for (code, registration_no, model, colour, owner) in DEMO_VEHICLES {
            self.upsert_vehicle(&VehicleForm {
                code: code.to_owned(),
                registration_no: registration_no.to_owned(),
                model: model.to_owned(),
                colour: colour.to_owned(),
                owner: owner.to_owned(),
            })
            .with_context(|| format!("insert demo vehicle {code}"))?;
        }

        for (code, vehicle_code, hour, charge, health, temperature, capacity, range) in
            DEMO_READINGS
        {
            self.record_battery_reading(&BatteryReadingForm {
                code: code.to_owned(),
                vehicle_code: vehicle_code.to_owned(),
                charge_percent: charge,
                health_percent: health,
                temperature_c: temperature,
                capacity_kwh: capacity,
                range_km: range,
                recorded_at: at_hour(today, hour)?,
            })
            .with_context(|| format!("insert demo battery reading {code}"))?;
        }

        let notifications: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
            .context("count notifications")?;
        if notifications == 0 {
            for (message, severity) in DEMO_NOTIFICATIONS {
                self.conn
                    .execute(
                        "INSERT INTO notifications (message, severity, created_at) VALUES (?, ?, ?)",
                        params![message, severity.as_str(), now],
                    )
                    .context("insert demo notification")?;
            }
        }

        self.conn
            .execute(
                "
                INSERT OR IGNORE INTO user_profile (
                  id, name, role, email, phone, username, created_on, last_login,
                  active, bio, updated_at
                ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                ",
                params![
                    "Saranya Prasad",
                    Role::Admin.as_str(),
                    "saranya.prasad@example.com",
                    "+91 9876543210",
                    "saranya.prasad",
                    "2023-10-01",
                    "2024-04-24",
                    "I'm overseeing the EV monitoring system and user management at EcoCharge.",
                    now,
                ],
            )
            .context("insert demo profile")?;

        info!("seeded demo data");
        Ok(())
    }

    pub fn list_trips(&self) -> Result<Vec<Trip>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT
                  id, code, trip_date, start_location, end_location, distance_km,
                  duration_minutes, avg_speed_kmh, energy_kwh, cost_paise, status,
                  notes, created_at, updated_at
                FROM trips
                ORDER BY trip_date ASC, id ASC
                ",
            )
            .context("prepare trips query")?;
        let rows = stmt
            .query_map([], |row| {
                let trip_date_raw: String = row.get(2)?;
                let status_raw: String = row.get(10)?;
                let created_at_raw: String = row.get(12)?;
                let updated_at_raw: String = row.get(13)?;

                Ok(Trip {
                    id: TripId::new(row.get(0)?),
                    code: row.get(1)?,
                    trip_date: parse_date(&trip_date_raw).map_err(to_sql_error)?,
                    start_location: row.get(3)?,
                    end_location: row.get(4)?,
                    distance_km: row.get(5)?,
                    duration_minutes: row.get(6)?,
                    avg_speed_kmh: row.get(7)?,
                    energy_kwh: row.get(8)?,
                    cost_paise: row.get(9)?,
                    status: enum_column(10, &status_raw, "trip status", TripStatus::parse)?,
                    notes: row.get(11)?,
                    created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
                    updated_at: parse_datetime(&updated_at_raw).map_err(to_sql_error)?,
                })
            })
            .context("query trips")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect trips")
    }

    pub fn create_trip(&self, trip: &TripForm) -> Result<TripId> {
        trip.validate()?;
        let code = if trip.code.trim().is_empty() {
            self.next_code("trips", "TRIP", 3)?
        } else {
            trip.code.trim().to_owned()
        };
        self.insert_trip(&code, trip)
    }

    /// Inserts or refreshes a trip keyed on its code.
    pub fn upsert_trip(&self, trip: &TripForm) -> Result<Upsert> {
        let code = trip.code.trim();
        if code.is_empty() {
            bail!("trip code is required for upsert -- the backend record has no trip_id");
        }
        trip.validate()?;

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM trips WHERE code = ?",
                params![code],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("look up trip {code}"))?;

        let Some(id) = existing else {
            self.insert_trip(code, trip)?;
            return Ok(Upsert::Inserted);
        };

        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                UPDATE trips SET
                  trip_date = ?, start_location = ?, end_location = ?, distance_km = ?,
                  duration_minutes = ?, avg_speed_kmh = ?, energy_kwh = ?, cost_paise = ?,
                  status = ?, notes = ?, updated_at = ?
                WHERE id = ?
                ",
                params![
                    format_date(trip.trip_date),
                    trip.start_location.trim(),
                    trip.end_location.trim(),
                    trip.distance_km,
                    trip.duration_minutes,
                    trip.avg_speed_kmh(),
                    trip.energy_kwh,
                    trip.cost_paise,
                    trip.status.as_str(),
                    trip.notes,
                    now,
                    id,
                ],
            )
            .with_context(|| format!("update trip {code}"))?;
        Ok(Upsert::Updated)
    }

    pub fn set_trip_status(&self, trip_id: TripId, status: TripStatus) -> Result<()> {
        let now = now_rfc3339()?;
        let rows_affected = self
            .conn
            .execute(
                "UPDATE trips SET status = ?, updated_at = ? WHERE id = ?",
                params![status.as_str(), now, trip_id.get()],
            )
            .context("update trip status")?;
        if rows_affected == 0 {
            bail!("trip {} not found", trip_id.get());
        }
        Ok(())
    }

    pub fn list_issues(&self) -> Result<Vec<VehicleIssue>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT
                  id, code, vehicle_no, error_code, category, description,
                  reported_on, resolved_on, severity, status, assignee, cost_paise,
                  notes, created_at, updated_at
                FROM vehicle_issues
                ORDER BY reported_on DESC, id DESC
                ",
            )
            .context("prepare issues query")?;
        let rows = stmt
            .query_map([], |row| {
                let reported_on_raw: String = row.get(6)?;
                let resolved_on_raw: Option<String> = row.get(7)?;
                let severity_raw: String = row.get(8)?;
                let status_raw: String = row.get(9)?;
                let created_at_raw: String = row.get(13)?;
                let updated_at_raw: String = row.get(14)?;

                Ok(VehicleIssue {
                    id: IssueId::new(row.get(0)?),
                    code: row.get(1)?,
                    vehicle_no: row.get(2)?,
                    error_code: row.get(3)?,
                    category: row.get(4)?,
                    description: row.get(5)?,
                    reported_on: parse_date(&reported_on_raw).map_err(to_sql_error)?,
                    resolved_on: parse_opt_date(resolved_on_raw).map_err(to_sql_error)?,
                    severity: enum_column(8, &severity_raw, "issue severity", Severity::parse)?,
                    status: enum_column(9, &status_raw, "issue status", IssueStatus::parse)?,
                    assignee: row.get(10)?,
                    cost_paise: row.get(11)?,
                    notes: row.get(12)?,
                    created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
                    updated_at: parse_datetime(&updated_at_raw).map_err(to_sql_error)?,
                })
            })
            .context("query issues")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect issues")
    }

    pub fn create_issue(&self, issue: &IssueForm) -> Result<IssueId> {
        issue.validate()?;
        let code = self.next_code("vehicle_issues", "ISS-", 3)?;
        self.insert_issue(&code, issue)
    }

    pub fn upsert_issue(&self, code: &str, issue: &IssueForm) -> Result<Upsert> {
        let code = code.trim();
        if code.is_empty() {
            bail!("issue code is required for upsert -- the backend record has no issue_id");
        }
        issue.validate()?;

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM vehicle_issues WHERE code = ?",
                params![code],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("look up issue {code}"))?;

        let Some(id) = existing else {
            self.insert_issue(code, issue)?;
            return Ok(Upsert::Inserted);
        };

        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                UPDATE vehicle_issues SET
                  vehicle_no = ?, error_code = ?, category = ?, description = ?,
                  reported_on = ?, resolved_on = ?, severity = ?, status = ?,
                  assignee = ?, cost_paise = ?, notes = ?, updated_at = ?
                WHERE id = ?
                ",
                params![
                    issue.vehicle_no.trim(),
                    issue.error_code.trim(),
                    issue.category.trim(),
                    issue.description,
                    format_date(issue.reported_on),
                    resolved_on_for(issue.status, issue.reported_on),
                    issue.severity.as_str(),
                    issue.status.as_str(),
                    issue.assignee.trim(),
                    issue.cost_paise,
                    issue.notes,
                    now,
                    id,
                ],
            )
            .with_context(|| format!("update issue {code}"))?;
        Ok(Upsert::Updated)
    }

    /// Resolving stamps today's date; reopening clears it.
    pub fn set_issue_status(&self, issue_id: IssueId, status: IssueStatus) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let rows_affected = self
            .conn
            .execute(
                "
                UPDATE vehicle_issues
                SET status = ?, resolved_on = ?, updated_at = ?
                WHERE id = ?
                ",
                params![
                    status.as_str(),
                    resolved_on_for(status, now.date()),
                    format_timestamp(now)?,
                    issue_id.get(),
                ],
            )
            .context("update issue status")?;
        if rows_affected == 0 {
            bail!("issue {} not found", issue_id.get());
        }
        Ok(())
    }

    pub fn list_invoices(&self) -> Result<Vec<Invoice>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT
                  id, number, vehicle_no, customer, service, issued_on,
                  amount_paise, status, created_at
                FROM invoices
                ORDER BY issued_on DESC, id DESC
                ",
            )
            .context("prepare invoices query")?;
        let rows = stmt
            .query_map([], |row| {
                let issued_on_raw: String = row.get(5)?;
                let status_raw: String = row.get(7)?;
                let created_at_raw: String = row.get(8)?;

                Ok(Invoice {
                    id: InvoiceId::new(row.get(0)?),
                    number: row.get(1)?,
                    vehicle_no: row.get(2)?,
                    customer: row.get(3)?,
                    service: row.get(4)?,
                    issued_on: parse_date(&issued_on_raw).map_err(to_sql_error)?,
                    amount_paise: row.get(6)?,
                    status: enum_column(7, &status_raw, "invoice status", InvoiceStatus::parse)?,
                    created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
                })
            })
            .context("query invoices")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect invoices")
    }

    pub fn set_invoice_status(&self, invoice_id: InvoiceId, status: InvoiceStatus) -> Result<()> {
        let rows_affected = self
            .conn
            .execute(
                "UPDATE invoices SET status = ? WHERE id = ?",
                params![status.as_str(), invoice_id.get()],
            )
            .context("update invoice status")?;
        if rows_affected == 0 {
            bail!("invoice {} not found", invoice_id.get());
        }
        Ok(())
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT
                  id, code, task, assignee, starts_at, deadline, priority, status,
                  created_at
                FROM jobs
                ORDER BY starts_at ASC, id ASC
                ",
            )
            .context("prepare jobs query")?;
        let rows = stmt
            .query_map([], |row| {
                let starts_at_raw: String = row.get(4)?;
                let deadline_raw: String = row.get(5)?;
                let priority_raw: String = row.get(6)?;
                let status_raw: String = row.get(7)?;
                let created_at_raw: String = row.get(8)?;

                Ok(Job {
                    id: JobId::new(row.get(0)?),
                    code: row.get(1)?,
                    task: row.get(2)?,
                    assignee: row.get(3)?,
                    starts_at: parse_minutes(&starts_at_raw).map_err(to_sql_error)?,
                    deadline: parse_minutes(&deadline_raw).map_err(to_sql_error)?,
                    priority: enum_column(6, &priority_raw, "job priority", JobPriority::parse)?,
                    status: enum_column(7, &status_raw, "job status", JobStatus::parse)?,
                    created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
                })
            })
            .context("query jobs")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect jobs")
    }

    pub fn create_job(&self, job: &JobForm) -> Result<JobId> {
        job.validate()?;
        let code = self.next_code("jobs", "J", 3)?;
        self.insert_job(&code, job)
    }

    /// Keyed on `code`, which remote service tasks derive from their id.
    pub fn upsert_job(&self, code: &str, job: &JobForm) -> Result<Upsert> {
        let code = code.trim();
        if code.is_empty() {
            bail!("job code is required for upsert -- the backend record has no service_id");
        }
        job.validate()?;

        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM jobs WHERE code = ?", params![code], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("look up job {code}"))?;

        let Some(id) = existing else {
            self.insert_job(code, job)?;
            return Ok(Upsert::Inserted);
        };

        self.conn
            .execute(
                "
                UPDATE jobs SET
                  task = ?, assignee = ?, starts_at = ?, deadline = ?, priority = ?, status = ?
                WHERE id = ?
                ",
                params![
                    job.task.trim(),
                    job.assignee.trim(),
                    format_datetime_minutes(job.starts_at),
                    format_datetime_minutes(job.deadline),
                    job.priority.as_str(),
                    job.status.as_str(),
                    id,
                ],
            )
            .with_context(|| format!("update job {code}"))?;
        Ok(Upsert::Updated)
    }

    pub fn set_job_status(&self, job_id: JobId, status: JobStatus) -> Result<()> {
        let rows_affected = self
            .conn
            .execute(
                "UPDATE jobs SET status = ? WHERE id = ?",
                params![status.as_str(), job_id.get()],
            )
            .context("update job status")?;
        if rows_affected == 0 {
            bail!("job {} not found", job_id.get());
        }
        Ok(())
    }

    /// Each vehicle carries its most recent battery reading.
    pub fn list_vehicles(&self) -> Result<Vec<Vehicle>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT
                  v.id, v.code, v.registration_no, v.model, v.colour, v.owner, v.created_at,
                  r.charge_percent, r.health_percent, r.temperature_c, r.capacity_kwh,
                  r.range_km, r.recorded_at
                FROM vehicles v
                LEFT JOIN battery_readings r ON r.id = (
                  SELECT latest.id
                  FROM battery_readings latest
                  WHERE latest.vehicle_id = v.id
                  ORDER BY latest.recorded_at DESC, latest.id DESC
                  LIMIT 1
                )
                ORDER BY v.code ASC, v.id ASC
                ",
            )
            .context("prepare vehicles query")?;
        let rows = stmt
            .query_map([], |row| {
                let created_at_raw: String = row.get(6)?;
                let recorded_at_raw: Option<String> = row.get(12)?;
                let battery = match recorded_at_raw {
                    Some(raw) => Some(BatteryReading {
                        charge_percent: row.get(7)?,
                        health_percent: row.get(8)?,
                        temperature_c: row.get(9)?,
                        capacity_kwh: row.get(10)?,
                        range_km: row.get(11)?,
                        recorded_at: parse_minutes(&raw).map_err(to_sql_error)?,
                    }),
                    None => None,
                };

                Ok(Vehicle {
                    id: VehicleId::new(row.get(0)?),
                    code: row.get(1)?,
                    registration_no: row.get(2)?,
                    model: row.get(3)?,
                    colour: row.get(4)?,
                    owner: row.get(5)?,
                    battery,
                    created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
                })
            })
            .context("query vehicles")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect vehicles")
    }

    pub fn create_vehicle(&self, vehicle: &VehicleForm) -> Result<VehicleId> {
        vehicle.validate()?;
        let code = match vehicle.code.trim() {
            "" => self.next_code("vehicles", "VEH", 3)?,
            given => given.to_owned(),
        };
        self.insert_vehicle(&code, vehicle)
    }

    pub fn upsert_vehicle(&self, vehicle: &VehicleForm) -> Result<Upsert> {
        let code = vehicle.code.trim();
        if code.is_empty() {
            bail!("vehicle code is required for upsert -- the backend record has no vehicle_id");
        }
        vehicle.validate()?;

        let Some(id) = self.vehicle_id_for(code)? else {
            self.insert_vehicle(code, vehicle)?;
            return Ok(Upsert::Inserted);
        };

        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                UPDATE vehicles SET
                  registration_no = ?, model = ?, colour = ?, owner = ?, updated_at = ?
                WHERE id = ?
                ",
                params![
                    vehicle.registration_no.trim(),
                    vehicle.model.trim(),
                    vehicle.colour.trim(),
                    vehicle.owner.trim(),
                    now,
                    id.get(),
                ],
            )
            .with_context(|| format!("update vehicle {code}"))?;
        Ok(Upsert::Updated)
    }

    /// Inserts or updates the reading keyed on its code. The vehicle must
    /// already exist.
    pub fn record_battery_reading(&self, reading: &BatteryReadingForm) -> Result<Upsert> {
        reading.validate()?;
        let code = reading.code.trim();
        let vehicle_code = reading.vehicle_code.trim();
        let Some(vehicle_id) = self.vehicle_id_for(vehicle_code)? else {
            bail!(
                "vehicle {vehicle_code} not found for battery reading {code} -- add or sync the vehicle first"
            );
        };

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM battery_readings WHERE code = ?",
                params![code],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("look up battery reading {code}"))?;
        let recorded_at = format_datetime_minutes(reading.recorded_at);

        if let Some(id) = existing {
            self.conn
                .execute(
                    "
                    UPDATE battery_readings SET
                      vehicle_id = ?, charge_percent = ?, health_percent = ?,
                      temperature_c = ?, capacity_kwh = ?, range_km = ?, recorded_at = ?
                    WHERE id = ?
                    ",
                    params![
                        vehicle_id.get(),
                        reading.charge_percent,
                        reading.health_percent,
                        reading.temperature_c,
                        reading.capacity_kwh,
                        reading.range_km,
                        recorded_at,
                        id,
                    ],
                )
                .with_context(|| format!("update battery reading {code}"))?;
            return Ok(Upsert::Updated);
        }

        self.conn
            .execute(
                "
                INSERT INTO battery_readings (
                  code, vehicle_id, charge_percent, health_percent, temperature_c,
                  capacity_kwh, range_km, recorded_at, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
                params![
                    code,
                    vehicle_id.get(),
                    reading.charge_percent,
                    reading.health_percent,
                    reading.temperature_c,
                    reading.capacity_kwh,
                    reading.range_km,
                    recorded_at,
                    now_rfc3339()?,
                ],
            )
            .with_context(|| format!("insert battery reading {code}"))?;
        debug!(code, vehicle = vehicle_code, "recorded battery reading");
        Ok(Upsert::Inserted)
    }

    pub fn list_products(&self) -> Result<Vec<Product>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, price_paise FROM products ORDER BY id ASC")
            .context("prepare products query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Product {
                    id: ProductId::new(row.get(0)?),
                    name: row.get(1)?,
                    price_paise: row.get(2)?,
                })
            })
            .context("query products")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect products")
    }

    pub fn list_bill_items(&self) -> Result<Vec<BillItem>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, name, quantity, rate_paise, tax_percent, created_at
                FROM bill_items
                ORDER BY id ASC
                ",
            )
            .context("prepare bill items query")?;
        let rows = stmt
            .query_map([], bill_item_from_row)
            .context("query bill items")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect bill items")
    }

    pub fn add_bill_item(&self, item: &BillItemForm) -> Result<BillItemId> {
        item.validate()?;
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO bill_items (name, quantity, rate_paise, tax_percent, created_at)
                VALUES (?, ?, ?, ?, ?)
                ",
                params![
                    item.name,
                    item.quantity,
                    item.rate_paise,
                    item.tax_percent,
                    now,
                ],
            )
            .context("insert bill item")?;
        Ok(BillItemId::new(self.conn.last_insert_rowid()))
    }

    /// Adds one unit of a catalogue product at its list price.
    pub fn add_product_to_bill(&self, product_id: ProductId) -> Result<BillItemId> {
        let product = self
            .conn
            .query_row(
                "SELECT name, price_paise FROM products WHERE id = ?",
                params![product_id.get()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .context("look up product")?;
        let Some((name, price_paise)) = product else {
            bail!(
                "product {} not found -- pick a product from the catalogue",
                product_id.get()
            );
        };

        self.add_bill_item(&BillItemForm {
            name,
            quantity: 1,
            rate_paise: price_paise,
            tax_percent: 0,
        })
    }

    pub fn remove_bill_item(&self, item_id: BillItemId) -> Result<()> {
        let rows_affected = self
            .conn
            .execute(
                "DELETE FROM bill_items WHERE id = ?",
                params![item_id.get()],
            )
            .context("delete bill item")?;
        if rows_affected == 0 {
            bail!("bill item {} not found", item_id.get());
        }
        Ok(())
    }

    pub fn bill_summary(&self) -> Result<BillSummary> {
        Ok(BillSummary::from_items(&self.list_bill_items()?))
    }

    /// Turns the current bill into a pending invoice numbered after the last
    /// one and empties the bill.
    pub fn create_invoice_from_bill(&self, invoice: &InvoiceForm) -> Result<Invoice> {
        invoice.validate()?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin invoice transaction")?;

        let items = self.list_bill_items()?;
        if items.is_empty() {
            bail!("bill is empty -- add items before generating an invoice");
        }
        let summary = BillSummary::from_items(&items);

        let number = invoice_number(self.max_invoice_sequence()? + 1);

        let created_at = OffsetDateTime::now_utc();
        let issued_on = created_at.date();
        tx.execute(
            "
            INSERT INTO invoices (
              number, vehicle_no, customer, service, issued_on, amount_paise,
              status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                number,
                invoice.vehicle_no.trim(),
                invoice.customer.trim(),
                invoice.service.trim(),
                format_date(issued_on),
                summary.total_paise,
                InvoiceStatus::Pending.as_str(),
                format_timestamp(created_at)?,
            ],
        )
        .context("insert invoice")?;
        let id = InvoiceId::new(tx.last_insert_rowid());

        tx.execute("DELETE FROM bill_items", [])
            .context("clear bill")?;
        tx.commit().context("commit invoice")?;

        info!(%number, total_paise = summary.total_paise, "generated invoice from bill");
        Ok(Invoice {
            id,
            number,
            vehicle_no: invoice.vehicle_no.trim().to_owned(),
            customer: invoice.customer.trim().to_owned(),
            service: invoice.service.trim().to_owned(),
            issued_on,
            amount_paise: summary.total_paise,
            status: InvoiceStatus::Pending,
            created_at,
        })
    }

    pub fn list_help_articles(&self) -> Result<Vec<HelpArticle>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, body FROM help_articles ORDER BY id ASC")
            .context("prepare help articles query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(HelpArticle {
                    id: HelpArticleId::new(row.get(0)?),
                    title: row.get(1)?,
                    body: row.get(2)?,
                })
            })
            .context("query help articles")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect help articles")
    }

    pub fn create_support_ticket(&self, ticket: &SupportTicketForm) -> Result<SupportTicketId> {
        ticket.validate()?;
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO support_tickets (name, email, subject, message, created_at)
                VALUES (?, ?, ?, ?, ?)
                ",
                params![
                    ticket.name,
                    ticket.email.trim(),
                    ticket.subject,
                    ticket.message,
                    now,
                ],
            )
            .context("insert support ticket")?;
        Ok(SupportTicketId::new(self.conn.last_insert_rowid()))
    }

    pub fn list_support_tickets(&self) -> Result<Vec<SupportTicket>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, name, email, subject, message, created_at
                FROM support_tickets
                ORDER BY created_at DESC, id DESC
                ",
            )
            .context("prepare support tickets query")?;
        let rows = stmt
            .query_map([], |row| {
                let created_at_raw: String = row.get(5)?;
                Ok(SupportTicket {
                    id: SupportTicketId::new(row.get(0)?),
                    name: row.get(1)?,
                    email: row.get(2)?,
                    subject: row.get(3)?,
                    message: row.get(4)?,
                    created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
                })
            })
            .context("query support tickets")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect support tickets")
    }

    /// Active notifications, newest first.
    pub fn list_notifications(&self) -> Result<Vec<Notification>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, message, severity, created_at
                FROM notifications
                WHERE dismissed_at IS NULL
                ORDER BY created_at DESC, id ASC
                ",
            )
            .context("prepare notifications query")?;
        let rows = stmt
            .query_map([], |row| {
                let severity_raw: String = row.get(2)?;
                let created_at_raw: String = row.get(3)?;
                Ok(Notification {
                    id: NotificationId::new(row.get(0)?),
                    message: row.get(1)?,
                    severity: enum_column(
                        2,
                        &severity_raw,
                        "notification severity",
                        Severity::parse,
                    )?,
                    created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
                })
            })
            .context("query notifications")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect notifications")
    }

    pub fn create_notification(&self, message: &str, severity: Severity) -> Result<NotificationId> {
        if message.trim().is_empty() {
            bail!("notification message is required");
        }
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO notifications (message, severity, created_at) VALUES (?, ?, ?)",
                params![message.trim(), severity.as_str(), now],
            )
            .context("insert notification")?;
        Ok(NotificationId::new(self.conn.last_insert_rowid()))
    }

    pub fn dismiss_notification(&self, notification_id: NotificationId) -> Result<()> {
        let now = now_rfc3339()?;
        let rows_affected = self
            .conn
            .execute(
                "
                UPDATE notifications SET dismissed_at = ?
                WHERE id = ? AND dismissed_at IS NULL
                ",
                params![now, notification_id.get()],
            )
            .context("dismiss notification")?;
        if rows_affected == 0 {
            bail!(
                "notification {} not found or already dismissed",
                notification_id.get()
            );
        }
        Ok(())
    }

    pub fn get_profile(&self) -> Result<Option<UserProfile>> {
        self.conn
            .query_row(
                "
                SELECT name, role, email, phone, username, created_on, last_login, active, bio
                FROM user_profile
                WHERE id = 1
                ",
                [],
                |row| {
                    let role_raw: String = row.get(1)?;
                    let created_on_raw: String = row.get(5)?;
                    let last_login_raw: Option<String> = row.get(6)?;
                    Ok(UserProfile {
                        name: row.get(0)?,
                        role: enum_column(1, &role_raw, "role", Role::parse)?,
                        email: row.get(2)?,
                        phone: row.get(3)?,
                        username: row.get(4)?,
                        created_on: parse_date(&created_on_raw).map_err(to_sql_error)?,
                        last_login: parse_opt_date(last_login_raw).map_err(to_sql_error)?,
                        active: row.get(7)?,
                        bio: row.get(8)?,
                    })
                },
            )
            .optional()
            .context("load profile")
    }

    pub fn update_profile(&self, profile: &ProfileForm) -> Result<()> {
        profile.validate()?;
        let now = now_rfc3339()?;
        let rows_affected = self
            .conn
            .execute(
                "
                UPDATE user_profile
                SET name = ?, email = ?, phone = ?, bio = ?, updated_at = ?
                WHERE id = 1
                ",
                params![
                    profile.name.trim(),
                    profile.email.trim(),
                    profile.phone.trim(),
                    profile.bio,
                    now,
                ],
            )
            .context("update profile")?;
        if rows_affected == 0 {
            bail!("no profile yet -- sign in with --login or load --demo data first");
        }
        Ok(())
    }

    /// Creates the profile on first sign-in and refreshes identity fields
    /// and the last login date afterwards.
    pub fn record_login(&self, user: &SessionUser, today: Date) -> Result<()> {
        let now = now_rfc3339()?;
        let today = format_date(today);
        let username = user
            .email
            .split_once('@')
            .map_or(user.email.as_str(), |(local, _)| local);
        self.conn
            .execute(
                "
                INSERT INTO user_profile (
                  id, name, role, email, username, created_on, last_login, active, updated_at
                ) VALUES (1, ?, ?, ?, ?, ?, ?, 1, ?)
                ON CONFLICT (id) DO UPDATE SET
                  name = excluded.name,
                  role = excluded.role,
                  email = excluded.email,
                  last_login = excluded.last_login,
                  updated_at = excluded.updated_at
                ",
                params![
                    user.name,
                    user.role.as_str(),
                    user.email,
                    username,
                    today,
                    today,
                    now,
                ],
            )
            .context("record login")?;
        Ok(())
    }

    pub fn fleet_summary(&self, now: PrimitiveDateTime) -> Result<FleetSummary> {
        let open_issues: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM vehicle_issues WHERE status != ?",
                params![IssueStatus::Resolved.as_str()],
                |row| row.get(0),
            )
            .context("count open issues")?;

        let (pending_invoices, pending_amount_paise): (i64, i64) = self
            .conn
            .query_row(
                "
                SELECT COUNT(*), COALESCE(SUM(amount_paise), 0)
                FROM invoices
                WHERE status = ?
                ",
                params![InvoiceStatus::Pending.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("sum pending invoices")?;

        let mut summary = FleetSummary {
            open_issues: usize::try_from(open_issues).unwrap_or(0),
            pending_invoices: usize::try_from(pending_invoices).unwrap_or(0),
            pending_amount_paise,
            ..FleetSummary::default()
        };
        for job in self.list_jobs()? {
            if job.status == JobStatus::Completed {
                continue;
            }
            match job.sla(now) {
                SlaStatus::AtRisk => summary.jobs_at_risk += 1,
                SlaStatus::Breached => summary.jobs_breached += 1,
                SlaStatus::OnTrack => {}
            }
        }
        summary.vehicles_needing_attention = self
            .list_vehicles()?
            .iter()
            .filter(|vehicle| vehicle.needs_attention())
            .count();
        Ok(summary)
    }

    fn insert_trip(&self, code: &str, trip: &TripForm) -> Result<TripId> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO trips (
                  code, trip_date, start_location, end_location, distance_km,
                  duration_minutes, avg_speed_kmh, energy_kwh, cost_paise, status,
                  notes, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
                params![
                    code,
                    format_date(trip.trip_date),
                    trip.start_location.trim(),
                    trip.end_location.trim(),
                    trip.distance_km,
                    trip.duration_minutes,
                    trip.avg_speed_kmh(),
                    trip.energy_kwh,
                    trip.cost_paise,
                    trip.status.as_str(),
                    trip.notes,
                    now,
                    now,
                ],
            )
            .with_context(|| format!("insert trip {code}"))?;
        Ok(TripId::new(self.conn.last_insert_rowid()))
    }

    fn insert_issue(&self, code: &str, issue: &IssueForm) -> Result<IssueId> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO vehicle_issues (
                  code, vehicle_no, error_code, category, description, reported_on,
                  resolved_on, severity, status, assignee, cost_paise, notes,
                  created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
                params![
                    code,
                    issue.vehicle_no.trim(),
                    issue.error_code.trim(),
                    issue.category.trim(),
                    issue.description,
                    format_date(issue.reported_on),
                    resolved_on_for(issue.status, issue.reported_on),
                    issue.severity.as_str(),
                    issue.status.as_str(),
                    issue.assignee.trim(),
                    issue.cost_paise,
                    issue.notes,
                    now,
                    now,
                ],
            )
            .with_context(|| format!("insert issue {code}"))?;
        Ok(IssueId::new(self.conn.last_insert_rowid()))
    }

    fn insert_job(&self, code: &str, job: &JobForm) -> Result<JobId> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO jobs (
                  code, task, assignee, starts_at, deadline, priority, status, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ",
                params![
                    code,
                    job.task.trim(),
                    job.assignee.trim(),
                    format_datetime_minutes(job.starts_at),
                    format_datetime_minutes(job.deadline),
                    job.priority.as_str(),
                    job.status.as_str(),
                    now,
                ],
            )
            .with_context(|| format!("insert job {code}"))?;
        Ok(JobId::new(self.conn.last_insert_rowid()))
    }

    fn insert_vehicle(&self, code: &str, vehicle: &VehicleForm) -> Result<VehicleId> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO vehicles (
                  code, registration_no, model, colour, owner, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
                params![
                    code,
                    vehicle.registration_no.trim(),
                    vehicle.model.trim(),
                    vehicle.colour.trim(),
                    vehicle.owner.trim(),
                    now,
                    now,
                ],
            )
            .with_context(|| format!("insert vehicle {code}"))?;
        Ok(VehicleId::new(self.conn.last_insert_rowid()))
    }

    fn vehicle_id_for(&self, code: &str) -> Result<Option<VehicleId>> {
        self.conn
            .query_row(
                "SELECT id FROM vehicles WHERE code = ?",
                params![code],
                |row| row.get(0).map(VehicleId::new),
            )
            .optional()
            .with_context(|| format!("look up vehicle {code}"))
    }

    /// Next `<prefix><n>` code for `table`, zero padded to `width` digits.
    fn next_code(&self, table: &str, prefix: &str, width: usize) -> Result<String> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT code FROM {table} WHERE code LIKE ?"))
            .with_context(|| format!("prepare {table} code query"))?;
        let codes = stmt
            .query_map(params![format!("{prefix}%")], |row| row.get::<_, String>(0))
            .with_context(|| format!("query {table} codes"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect {table} codes"))?;
        let last = codes
            .iter()
            .filter_map(|code| code.strip_prefix(prefix)?.parse::<i64>().ok())
            .max()
            .unwrap_or(0);
        Ok(format!("{prefix}{:0width$}", last + 1))
    }

    fn max_invoice_sequence(&self) -> Result<i64> {
        let mut stmt = self
            .conn
            .prepare("SELECT number FROM invoices")
            .context("prepare invoice numbers query")?;
        let numbers = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query invoice numbers")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect invoice numbers")?;
        Ok(numbers
            .iter()
            .filter_map(|number| invoice_sequence(number))
            .max()
            .unwrap_or(0))
    }
}

type DemoTrip = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    i64,
    i64,
    i64,
    i64,
    i64,
    TripStatus,
    &'static str,
);

const DEMO_TRIPS: [DemoTrip; 6] = [
    (
        "TRIP001",
        "2026-01-05",
        "Chennai",
        "Bangalore",
        346,
        390,
        53,
        24,
        2800,
        TripStatus::Completed,
        "Smooth highway drive",
    ),
    (
        "TRIP002",
        "2026-01-10",
        "Coimbatore",
        "Ooty",
        85,
        195,
        26,
        8,
        1200,
        TripStatus::Completed,
        "Hilly road with heavy traffic",
    ),
    (
        "TRIP003",
        "2026-01-15",
        "Madurai",
        "Rameswaram",
        170,
        240,
        42,
        12,
        1500,
        TripStatus::Completed,
        "Pleasant coastal drive",
    ),
    (
        "TRIP004",
        "2026-02-01",
        "Salem",
        "Trichy",
        140,
        180,
        46,
        10,
        1100,
        TripStatus::Ongoing,
        "Minor traffic near city limits",
    ),
    (
        "TRIP005",
        "2026-02-03",
        "Erode",
        "Chennai",
        400,
        440,
        55,
        28,
        3200,
        TripStatus::Cancelled,
        "Cancelled due to vehicle issue",
    ),
    (
        "TRIP006",
        "2026-02-04",
        "Tirunelveli",
        "Kanyakumari",
        90,
        130,
        41,
        7,
        900,
        TripStatus::Completed,
        "Short and scenic trip",
    ),
];

type DemoIssue = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    Severity,
    IssueStatus,
);

const DEMO_ISSUES: [DemoIssue; 3] = [
    (
        "ISS-001",
        "EV-1023",
        "BMS-021",
        "Battery",
        "Battery temperature exceeded safe threshold",
        "2026-01-10",
        Severity::High,
        IssueStatus::Open,
    ),
    (
        "ISS-002",
        "EV-1045",
        "MCU-014",
        "Motor Controller",
        "Motor controller communication failure",
        "2026-01-09",
        Severity::Medium,
        IssueStatus::InProgress,
    ),
    (
        "ISS-003",
        "EV-1099",
        "CHG-008",
        "Charging",
        "Charging interrupted due to voltage fluctuation",
        "2026-01-07",
        Severity::Low,
        IssueStatus::Resolved,
    ),
];

type DemoInvoice = (
    i64,
    &'static str,
    &'static str,
    &'static str,
    i64,
    InvoiceStatus,
    &'static str,
);

const DEMO_INVOICES: [DemoInvoice; 10] = [
    (1, "TN09 AB 1234", "Rahul Sharma", "Battery Check", 4500, InvoiceStatus::Paid, "2026-01-12"),
    (2, "KA05 CD 8899", "Ananya Patel", "General Service", 2800, InvoiceStatus::Pending, "2026-01-11"),
    (3, "MH12 EF 4567", "Amit Verma", "Brake Service", 3200, InvoiceStatus::Paid, "2026-01-10"),
    (4, "DL01 GH 9988", "Neha Singh", "Wheel Alignment", 1500, InvoiceStatus::Paid, "2026-01-09"),
    (5, "TN22 JK 7766", "Suresh Kumar", "Motor Check", 5000, InvoiceStatus::Pending, "2026-01-08"),
    (6, "KA03 LM 3344", "Priya Nair", "Battery Replacement", 18000, InvoiceStatus::Paid, "2026-01-07"),
    (7, "AP09 NP 2211", "Ravi Teja", "Software Update", 1200, InvoiceStatus::Paid, "2026-01-06"),
    (8, "KL07 QR 6655", "Meera Das", "AC Service", 2400, InvoiceStatus::Pending, "2026-01-05"),
    (9, "GJ01 ST 9900", "Karan Shah", "Tyre Replacement", 9600, InvoiceStatus::Paid, "2026-01-04"),
    (10, "RJ14 UV 1122", "Pooja Mehta", "Full Inspection", 3000, InvoiceStatus::Paid, "2026-01-03"),
];

type DemoJob = (
    &'static str,
    &'static str,
    &'static str,
    u8,
    u8,
    JobPriority,
    JobStatus,
);

const DEMO_JOBS: [DemoJob; 4] = [
    ("J001", "Inspect Vehicle", "John Doe", 9, 12, JobPriority::Critical, JobStatus::Assigned),
    ("J002", "Load Cargo", "Jane Smith", 10, 13, JobPriority::High, JobStatus::InProgress),
    ("J003", "Delivery Check", "Alex Brown", 11, 15, JobPriority::Normal, JobStatus::Completed),
    ("J004", "Unload Materials", "Emma White", 12, 16, JobPriority::High, JobStatus::Assigned),
];

const DEMO_VEHICLES: [(&str, &str, &str, &str, &str); 5] = [
    ("VEH001", "TN09 AB 1234", "Tata Nexon EV", "Pristine White", "Rahul Sharma"),
    ("VEH002", "KA05 CD 8899", "MG ZS EV", "Candy White", "Ananya Patel"),
    ("VEH003", "TN-09-EV-4582", "Mahindra XUV400", "Napoli Black", "Saranya Prasad"),
    ("VEH004", "MH12 EF 4567", "Hyundai Kona Electric", "Fiery Red", "Amit Verma"),
    ("VEH005", "KL07 QR 6655", "Tata Tiago EV", "Tropical Mist", "Meera Das"),
];

/// Code, vehicle, hour of `today`, charge %, health %, °C, kWh, range km.
type DemoReading = (&'static str, &'static str, u8, i64, i64, i64, i64, i64);

const DEMO_READINGS: [DemoReading; 5] = [
    ("STAT001", "VEH001", 8, 64, 96, 31, 40, 210),
    ("STAT002", "VEH001", 12, 58, 96, 33, 40, 190),
    ("STAT003", "VEH002", 9, 18, 91, 29, 50, 70),
    ("STAT004", "VEH003", 10, 72, 74, 38, 39, 230),
    ("STAT005", "VEH004", 11, 81, 93, 47, 39, 290),
];

const DEMO_NOTIFICATIONS: [(&str, Severity); 10] = [
    ("Battery temperature exceeded safe limit at Station 3", Severity::High),
    ("Charging session interrupted due to voltage fluctuation", Severity::High),
    ("New firmware update available for Battery Pack A12", Severity::Medium),
    ("Charging station 5 is under maintenance", Severity::Medium),
    ("Vehicle BMS communication delay detected", Severity::Medium),
    ("Low battery health detected in Vehicle TN-09-EV-4582", Severity::High),
    ("Scheduled system diagnostic completed successfully", Severity::Low),
    ("New user registered in the EV monitoring system", Severity::Low),
    ("Charging efficiency dropped below 85% at Station 2", Severity::Medium),
    ("Backup power supply activated during grid outage", Severity::High),
];

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("FLEETVIEW_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set FLEETVIEW_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("fleetview.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn bill_item_from_row(row: &Row<'_>) -> rusqlite::Result<BillItem> {
    let created_at_raw: String = row.get(5)?;
    Ok(BillItem {
        id: BillItemId::new(row.get(0)?),
        name: row.get(1)?,
        quantity: row.get(2)?,
        rate_paise: row.get(3)?,
        tax_percent: row.get(4)?,
        created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
    })
}

fn resolved_on_for(status: IssueStatus, date: Date) -> Option<String> {
    (status == IssueStatus::Resolved).then(|| format_date(date))
}

fn at_hour(day: Date, hour: u8) -> Result<PrimitiveDateTime> {
    let time = Time::from_hms(hour, 0, 0).with_context(|| format!("invalid hour {hour}"))?;
    Ok(day.with_time(time))
}

fn enum_column<T>(
    index: usize,
    raw: &str,
    what: &str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown {what} {raw}"),
            )),
        )
    })
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection, required: &[(&str, &[&str])]) -> Result<()> {
    for (table, required_columns) in required {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; point storage.db_path at a fleetview database or remove the file"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; run migration before launching",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }

    let existing_indexes = index_names(conn)?;
    let missing = REQUIRED_INDEXES
        .iter()
        .filter(|index| !existing_indexes.contains(index.name))
        .map(|index| index.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!(
            "database is missing required indexes: {}; run migration before launching",
            missing.join(", ")
        );
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    let names = rows
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))?;
    Ok(names)
}

fn index_names(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = 'index'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .context("prepare index names query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query index names")?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .context("collect index names")
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    format_timestamp(OffsetDateTime::now_utc())
}

fn format_timestamp(value: OffsetDateTime) -> Result<String> {
    value.format(&Rfc3339).context("format timestamp")
}

fn parse_datetime(raw: &str) -> Result<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(value);
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    bail!("unsupported datetime format {raw:?}")
}

fn parse_minutes(raw: &str) -> Result<PrimitiveDateTime> {
    parse_datetime_minutes(raw)
        .map_err(|error| anyhow!("{error} {raw:?}; expected YYYY-MM-DD HH:MM"))
}

fn parse_date(raw: &str) -> Result<Date> {
    if let Ok(value) = Date::parse(raw, &format_description!("[year]-[month]-[day]")) {
        return Ok(value);
    }

    // Dates written by other tools may carry a time component.
    let date_time = parse_datetime(raw)?;
    Ok(date_time.date())
}

fn parse_opt_date(raw: Option<String>) -> Result<Option<Date>> {
    raw.as_deref().map(parse_date).transpose()
}

fn to_sql_error(error: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            error.to_string(),
        )),
    )
}

fn format_date(value: Date) -> String {
    value
        .format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "1970-01-01".to_owned())
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
