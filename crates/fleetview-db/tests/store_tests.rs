// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use fleetview_app::{
    BatteryCondition, BillItemForm, InvoiceForm, InvoiceId, InvoiceStatus, IssueStatus, JobForm,
    JobId, JobPriority, JobStatus, ProfileForm, Role, SearchField, SessionUser, Severity,
    SupportTicketForm, TableView, Trip, TripId, TripStatus, VehicleForm, VehicleIssue,
};
use fleetview_db::{Store, Upsert, validate_db_path};
use fleetview_testkit::{FleetFaker, reference_day, reference_now, temp_db_path};
use time::Duration;
use time::macros::{date, datetime};

fn demo_store() -> Result<Store> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    store.seed_demo_data(reference_day())?;
    Ok(store)
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path(":memory:").is_ok());
    assert!(validate_db_path("/tmp/fleetview.db").is_ok());
}

#[test]
fn bootstrap_creates_schema_and_seed_defaults() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    let products = store.list_products()?;
    assert_eq!(
        products
            .iter()
            .map(|product| product.name.as_str())
            .collect::<Vec<_>>(),
        vec!["Engine Service", "Oil Change", "Trip Charge"]
    );
    assert_eq!(products[0].price_paise, 150_000);
    assert_eq!(store.list_help_articles()?.len(), 12);
    assert!(store.list_trips()?.is_empty());

    // Bootstrapping twice must not duplicate seeded rows.
    store.bootstrap()?;
    assert_eq!(store.list_products()?.len(), 3);
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    {
        let store = Store::open(&path)?;
        store
            .raw_connection()
            .execute_batch("CREATE TABLE trips (id INTEGER PRIMARY KEY, code TEXT NOT NULL);")?;
    }

    let store = Store::open(&path)?;
    let error = store
        .bootstrap()
        .expect_err("partial schema should be rejected");
    assert!(
        error
            .to_string()
            .contains("table `trips` is missing required columns"),
        "{error:#}"
    );
    Ok(())
}

#[test]
fn bootstrap_adds_vehicle_tables_to_older_database() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    {
        let store = Store::open(&path)?;
        store
            .raw_connection()
            .execute_batch(include_str!("../src/sql/schema.sql"))?;
    }

    let store = Store::open(&path)?;
    store.bootstrap()?;
    assert!(store.list_vehicles()?.is_empty());
    store.seed_demo_data(reference_day())?;
    assert_eq!(store.list_vehicles()?.len(), 5);
    Ok(())
}

#[test]
fn bootstrap_reopens_existing_database() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        store.seed_demo_data(reference_day())?;
    }

    let store = Store::open(&path)?;
    store.bootstrap()?;
    assert_eq!(store.list_trips()?.len(), 6);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
    Ok(())
}

#[test]
fn demo_seed_is_idempotent() -> Result<()> {
    let store = demo_store()?;
    store.seed_demo_data(reference_day())?;

    assert_eq!(store.list_trips()?.len(), 6);
    assert_eq!(store.list_issues()?.len(), 3);
    assert_eq!(store.list_invoices()?.len(), 10);
    assert_eq!(store.list_jobs()?.len(), 4);
    assert_eq!(store.list_vehicles()?.len(), 5);
    assert_eq!(store.list_notifications()?.len(), 10);

    let profile = store.get_profile()?.expect("demo profile");
    assert_eq!(profile.name, "Saranya Prasad");
    assert_eq!(profile.role, Role::Admin);
    assert_eq!(profile.created_on, date!(2023 - 10 - 01));
    Ok(())
}

#[test]
fn listings_use_deterministic_order() -> Result<()> {
    let store = demo_store()?;

    let trips = store.list_trips()?;
    assert_eq!(trips.first().map(|trip| trip.code.as_str()), Some("TRIP001"));
    assert_eq!(trips.last().map(|trip| trip.code.as_str()), Some("TRIP006"));
    assert_eq!(trips[0].route(), "Chennai → Bangalore");
    assert_eq!(trips[0].cost_paise, 280_000);

    let issues = store.list_issues()?;
    assert_eq!(
        issues
            .iter()
            .map(|issue| issue.code.as_str())
            .collect::<Vec<_>>(),
        vec!["ISS-001", "ISS-002", "ISS-003"]
    );
    assert_eq!(issues[2].resolved_on, Some(date!(2026 - 01 - 07)));
    assert_eq!(issues[0].resolved_on, None);

    let invoices = store.list_invoices()?;
    assert_eq!(invoices[0].number, "#00001");
    assert_eq!(invoices[9].number, "#00010");

    let jobs = store.list_jobs()?;
    assert_eq!(jobs[0].code, "J001");
    assert_eq!(jobs[0].starts_at.date(), reference_day());
    assert_eq!(jobs[0].starts_at.hour(), 9);
    Ok(())
}

#[test]
fn create_trip_assigns_next_code() -> Result<()> {
    let store = demo_store()?;
    let mut faker = FleetFaker::new(5);

    let id = store.create_trip(&faker.trip())?;
    let trips = store.list_trips()?;
    let created = trips
        .iter()
        .find(|trip| trip.id == id)
        .expect("created trip listed");
    assert_eq!(created.code, "TRIP007");
    assert!(created.avg_speed_kmh > 0);
    Ok(())
}

#[test]
fn create_trip_rejects_invalid_form() -> Result<()> {
    let store = demo_store()?;
    let mut trip = FleetFaker::new(9).trip();
    trip.end_location = "  ".to_owned();

    let error = store.create_trip(&trip).expect_err("route required");
    assert!(error.to_string().contains("trip route is required"));
    assert_eq!(store.list_trips()?.len(), 6);
    Ok(())
}

#[test]
fn upsert_trip_inserts_then_updates() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    let mut trip = FleetFaker::new(17).trip();
    trip.code = "T-900".to_owned();
    assert_eq!(store.upsert_trip(&trip)?, Upsert::Inserted);

    trip.status = TripStatus::Cancelled;
    trip.notes = "called off".to_owned();
    assert_eq!(store.upsert_trip(&trip)?, Upsert::Updated);

    let trips = store.list_trips()?;
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].status, TripStatus::Cancelled);
    assert_eq!(trips[0].notes, "called off");

    trip.code.clear();
    assert!(store.upsert_trip(&trip).is_err());
    Ok(())
}

#[test]
fn upsert_update_trims_text_like_insert() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    let mut trip = FleetFaker::new(21).trip();
    trip.code = "R-TRIP007".to_owned();
    trip.start_location = "  Pune ".to_owned();
    trip.end_location = " Mumbai  ".to_owned();
    assert_eq!(store.upsert_trip(&trip)?, Upsert::Inserted);
    assert_eq!(store.upsert_trip(&trip)?, Upsert::Updated);

    let trips = store.list_trips()?;
    assert_eq!(trips[0].start_location, "Pune");
    assert_eq!(trips[0].end_location, "Mumbai");

    let mut issue = FleetFaker::new(22).issue();
    issue.vehicle_no = " MH12AB1234 ".to_owned();
    issue.assignee = "Arjun Rao  ".to_owned();
    assert_eq!(store.upsert_issue("R-ISS-007", &issue)?, Upsert::Inserted);
    assert_eq!(store.upsert_issue("R-ISS-007", &issue)?, Upsert::Updated);

    let issues = store.list_issues()?;
    assert_eq!(issues[0].vehicle_no, "MH12AB1234");
    assert_eq!(issues[0].assignee, "Arjun Rao");
    Ok(())
}

#[test]
fn issue_status_tracks_resolution_date() -> Result<()> {
    let store = demo_store()?;
    let issue_id = store.create_issue(&FleetFaker::new(2).issue())?;

    store.set_issue_status(issue_id, IssueStatus::Resolved)?;
    let issues = store.list_issues()?;
    let resolved = find_issue(&issues, issue_id.get());
    assert_eq!(resolved.status, IssueStatus::Resolved);
    assert!(resolved.resolved_on.is_some());
    assert_eq!(resolved.code, "ISS-004");

    store.set_issue_status(issue_id, IssueStatus::InProgress)?;
    let issues = store.list_issues()?;
    let reopened = find_issue(&issues, issue_id.get());
    assert_eq!(reopened.resolved_on, None);
    Ok(())
}

#[test]
fn status_updates_report_missing_rows() -> Result<()> {
    let store = demo_store()?;
    let error = store
        .set_trip_status(TripId::new(999), TripStatus::Completed)
        .expect_err("missing trip");
    assert_eq!(error.to_string(), "trip 999 not found");

    assert!(
        store
            .set_job_status(JobId::new(999), JobStatus::Completed)
            .is_err()
    );
    assert!(
        store
            .set_invoice_status(InvoiceId::new(999), InvoiceStatus::Paid)
            .is_err()
    );
    Ok(())
}

#[test]
fn bill_to_invoice_flow() -> Result<()> {
    let store = demo_store()?;
    let products = store.list_products()?;

    store.add_product_to_bill(products[0].id)?;
    store.add_bill_item(&BillItemForm {
        name: "Brake Pads".to_owned(),
        quantity: 2,
        rate_paise: 100_000,
        tax_percent: 18,
    })?;

    let summary = store.bill_summary()?;
    assert_eq!(summary.items, 2);
    assert_eq!(summary.subtotal_paise, 350_000);
    assert_eq!(summary.tax_paise, 36_000);
    assert_eq!(summary.total_paise, 386_000);

    let invoice = store.create_invoice_from_bill(&InvoiceForm {
        customer: "Rahul Sharma".to_owned(),
        vehicle_no: "TN09 AB 1234".to_owned(),
        service: "Brake Service".to_owned(),
    })?;
    assert_eq!(invoice.number, "#00011");
    assert_eq!(invoice.amount_paise, 386_000);
    assert_eq!(invoice.status, InvoiceStatus::Pending);
    assert!(store.list_bill_items()?.is_empty());
    assert_eq!(store.list_invoices()?.len(), 11);
    Ok(())
}

#[test]
fn empty_bill_cannot_become_invoice() -> Result<()> {
    let store = demo_store()?;
    let error = store
        .create_invoice_from_bill(&InvoiceForm {
            customer: "Meera Das".to_owned(),
            vehicle_no: "KL07 QR 6655".to_owned(),
            service: "AC Service".to_owned(),
        })
        .expect_err("empty bill");
    assert!(error.to_string().contains("bill is empty"));
    assert_eq!(store.list_invoices()?.len(), 10);
    Ok(())
}

#[test]
fn remove_bill_item_deletes_once() -> Result<()> {
    let store = demo_store()?;
    let item_id = store.add_bill_item(&FleetFaker::new(4).bill_item())?;

    store.remove_bill_item(item_id)?;
    assert!(store.list_bill_items()?.is_empty());
    assert!(store.remove_bill_item(item_id).is_err());
    Ok(())
}

#[test]
fn notifications_hide_after_dismissal() -> Result<()> {
    let store = demo_store()?;
    let first = store.list_notifications()?[0].id;

    store.dismiss_notification(first)?;
    let remaining = store.list_notifications()?;
    assert_eq!(remaining.len(), 9);
    assert!(remaining.iter().all(|notification| notification.id != first));
    assert!(store.dismiss_notification(first).is_err());

    let id = store.create_notification("Charger 7 offline", Severity::High)?;
    assert!(
        store
            .list_notifications()?
            .iter()
            .any(|notification| notification.id == id)
    );
    Ok(())
}

#[test]
fn support_tickets_validate_email() -> Result<()> {
    let store = demo_store()?;
    let mut ticket = SupportTicketForm {
        name: "Priya Nair".to_owned(),
        email: "priya".to_owned(),
        subject: "Battery".to_owned(),
        message: "Charger keeps tripping".to_owned(),
    };
    assert!(store.create_support_ticket(&ticket).is_err());

    ticket.email = "priya@example.com".to_owned();
    store.create_support_ticket(&ticket)?;
    let tickets = store.list_support_tickets()?;
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].email, "priya@example.com");
    Ok(())
}

#[test]
fn profile_update_and_login_refresh() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    let form = ProfileForm {
        name: "Nobody".to_owned(),
        email: "nobody@example.com".to_owned(),
        phone: String::new(),
        bio: String::new(),
    };
    assert!(store.update_profile(&form).is_err());

    let user = SessionUser {
        user_id: 3,
        email: "tech@example.com".to_owned(),
        name: "Alex Brown".to_owned(),
        role: Role::Service,
    };
    store.record_login(&user, date!(2026 - 01 - 20))?;
    store.update_profile(&ProfileForm {
        bio: "Night shift lead".to_owned(),
        ..form
    })?;
    store.record_login(&user, date!(2026 - 01 - 23))?;

    let profile = store.get_profile()?.expect("profile after login");
    assert_eq!(profile.name, "Alex Brown");
    assert_eq!(profile.role, Role::Service);
    assert_eq!(profile.username, "tech");
    assert_eq!(profile.bio, "Night shift lead");
    assert_eq!(profile.created_on, date!(2026 - 01 - 20));
    assert_eq!(profile.last_login, Some(date!(2026 - 01 - 23)));
    Ok(())
}

#[test]
fn fleet_summary_counts_open_work() -> Result<()> {
    let store = demo_store()?;

    // Demo jobs run 09:00-16:00 on the reference day; at 11:30 J001 has
    // 30 minutes left and J003 is already completed.
    let summary = store.fleet_summary(reference_now() + Duration::minutes(150))?;
    assert_eq!(summary.open_issues, 2);
    assert_eq!(summary.pending_invoices, 3);
    assert_eq!(summary.pending_amount_paise, 1_020_000);
    assert_eq!(summary.jobs_at_risk, 1);
    assert_eq!(summary.jobs_breached, 0);
    assert_eq!(summary.vehicles_needing_attention, 3);

    let late = store.fleet_summary(reference_now() + Duration::hours(8))?;
    assert_eq!(late.jobs_breached, 3);
    Ok(())
}

#[test]
fn vehicles_list_their_latest_reading() -> Result<()> {
    let store = demo_store()?;
    let vehicles = store.list_vehicles()?;
    let codes: Vec<&str> = vehicles.iter().map(|vehicle| vehicle.code.as_str()).collect();
    assert_eq!(codes, vec!["VEH001", "VEH002", "VEH003", "VEH004", "VEH005"]);

    let nexon = &vehicles[0];
    let battery = nexon.battery.expect("VEH001 has readings");
    assert_eq!(battery.charge_percent, 58);
    assert_eq!(battery.recorded_at, datetime!(2026-01-23 12:00));
    assert_eq!(nexon.condition(), Some(BatteryCondition::Good));

    assert_eq!(vehicles[1].condition(), Some(BatteryCondition::LowCharge));
    assert_eq!(vehicles[2].condition(), Some(BatteryCondition::Degraded));
    assert_eq!(vehicles[3].condition(), Some(BatteryCondition::Overheating));
    assert_eq!(vehicles[4].battery, None);
    Ok(())
}

#[test]
fn create_vehicle_assigns_next_code() -> Result<()> {
    let store = demo_store()?;
    let mut faker = FleetFaker::new(5);
    let id = store.create_vehicle(&faker.vehicle())?;

    let vehicles = store.list_vehicles()?;
    let created = vehicles
        .iter()
        .find(|vehicle| vehicle.id == id)
        .expect("created vehicle listed");
    assert_eq!(created.code, "VEH006");
    assert_eq!(created.battery, None);

    let invalid = VehicleForm {
        model: " ".to_owned(),
        ..faker.vehicle()
    };
    assert!(store.create_vehicle(&invalid).is_err());
    Ok(())
}

#[test]
fn vehicle_and_reading_upserts_key_on_code() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let mut faker = FleetFaker::new(17);

    let orphan = faker.battery_reading("R-STAT001", "R-VEH001");
    let error = store
        .record_battery_reading(&orphan)
        .expect_err("vehicle must exist first");
    assert!(error.to_string().contains("add or sync the vehicle first"), "{error:#}");

    let vehicle = VehicleForm {
        code: "R-VEH001".to_owned(),
        registration_no: " TN09 AB 1234 ".to_owned(),
        model: "Tata Nexon EV".to_owned(),
        colour: String::new(),
        owner: String::new(),
    };
    assert_eq!(store.upsert_vehicle(&vehicle)?, Upsert::Inserted);
    let renamed = VehicleForm {
        owner: "rahul@example.com".to_owned(),
        ..vehicle
    };
    assert_eq!(store.upsert_vehicle(&renamed)?, Upsert::Updated);

    let mut reading = faker.battery_reading("R-STAT001", "R-VEH001");
    reading.recorded_at = datetime!(2026-01-23 08:00);
    assert_eq!(store.record_battery_reading(&reading)?, Upsert::Inserted);
    let mut newer = faker.battery_reading("R-STAT002", "R-VEH001");
    newer.recorded_at = datetime!(2026-01-23 10:00);
    newer.charge_percent = 77;
    assert_eq!(store.record_battery_reading(&newer)?, Upsert::Inserted);

    reading.charge_percent = 12;
    assert_eq!(store.record_battery_reading(&reading)?, Upsert::Updated);

    let vehicles = store.list_vehicles()?;
    assert_eq!(vehicles.len(), 1);
    assert_eq!(vehicles[0].registration_no, "TN09 AB 1234");
    assert_eq!(vehicles[0].owner, "rahul@example.com");
    assert_eq!(vehicles[0].battery.map(|battery| battery.charge_percent), Some(77));
    Ok(())
}

#[test]
fn upsert_job_inserts_then_updates() -> Result<()> {
    let store = demo_store()?;
    let job = JobForm {
        task: "Battery diagnostics".to_owned(),
        assignee: "tech@example.com".to_owned(),
        starts_at: datetime!(2026-01-23 13:00),
        deadline: datetime!(2026-01-23 17:00),
        priority: JobPriority::High,
        status: JobStatus::Assigned,
    };
    assert_eq!(store.upsert_job("R-SVC004", &job)?, Upsert::Inserted);

    let started = JobForm {
        status: JobStatus::InProgress,
        ..job.clone()
    };
    assert_eq!(store.upsert_job("R-SVC004", &started)?, Upsert::Updated);

    let jobs = store.list_jobs()?;
    assert_eq!(jobs.len(), 5);
    let synced = jobs
        .iter()
        .find(|job| job.code == "R-SVC004")
        .expect("synced job listed");
    assert_eq!(synced.status, JobStatus::InProgress);
    assert!(store.upsert_job(" ", &job).is_err());
    Ok(())
}

#[test]
fn table_view_pages_store_rows() -> Result<()> {
    let store = demo_store()?;
    let mut faker = FleetFaker::new(21);
    for _ in 0..9 {
        store.create_trip(&faker.trip())?;
    }

    let trips = store.list_trips()?;
    let code: SearchField<Trip> = |trip| trip.code.as_str();
    let from: SearchField<Trip> = |trip| trip.start_location.as_str();
    let to: SearchField<Trip> = |trip| trip.end_location.as_str();
    let fields = vec![code, from, to];
    let mut view = TableView::new(trips, 5, fields)?;
    assert_eq!(view.page_count(), 3);
    assert!(view.advance());
    assert!(view.advance());
    assert_eq!(view.current_page().len(), 5);
    assert!(!view.advance());

    view.set_filter_query("chennai");
    assert!(view.filtered_len() >= 2);
    assert!(view.current_page().iter().all(|trip| {
        trip.start_location.eq_ignore_ascii_case("chennai")
            || trip.end_location.eq_ignore_ascii_case("chennai")
            || trip.code.to_lowercase().contains("chennai")
    }));
    Ok(())
}

fn find_issue(issues: &[VehicleIssue], id: i64) -> &VehicleIssue {
    issues
        .iter()
        .find(|issue| issue.id.get() == id)
        .expect("issue listed")
}
