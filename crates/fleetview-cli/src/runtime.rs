// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use fleetview_api::{Client, merge_vehicle_stats};
use fleetview_app::{
    FleetSummary, FormPayload, ProductId, RowAction, ScreenKind, UserProfile,
};
use fleetview_db::{Store, Upsert};
use fleetview_tui::{AppRuntime, RowTarget, ScreenSnapshot};
use std::collections::BTreeSet;
use std::fmt;
use time::PrimitiveDateTime;
use tracing::{info, warn};

pub struct DbRuntime<'a> {
    store: &'a Store,
    client: Option<Client>,
    page_size: usize,
}

impl<'a> DbRuntime<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            client: None,
            page_size: fleetview_tui::DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_client(mut self, client: Option<Client>) -> Self {
        self.client = client;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl AppRuntime for DbRuntime<'_> {
    fn load_summary(&mut self) -> Result<FleetSummary> {
        self.store.fleet_summary(self.now())
    }

    fn load_screen(&mut self, screen: ScreenKind) -> Result<ScreenSnapshot> {
        let snapshot = match screen {
            ScreenKind::Trips => ScreenSnapshot::Trips(self.store.list_trips()?),
            ScreenKind::Issues => ScreenSnapshot::Issues(self.store.list_issues()?),
            ScreenKind::Invoices => ScreenSnapshot::Invoices(self.store.list_invoices()?),
            ScreenKind::Vehicles => ScreenSnapshot::Vehicles(self.store.list_vehicles()?),
            ScreenKind::Jobs => ScreenSnapshot::Jobs(self.store.list_jobs()?),
            ScreenKind::Billing => ScreenSnapshot::Billing {
                items: self.store.list_bill_items()?,
                products: self.store.list_products()?,
            },
            ScreenKind::Help => ScreenSnapshot::Help(self.store.list_help_articles()?),
            ScreenKind::Notifications => {
                ScreenSnapshot::Notifications(self.store.list_notifications()?)
            }
        };
        Ok(snapshot)
    }

    fn load_profile(&mut self) -> Result<Option<UserProfile>> {
        self.store.get_profile()
    }

    fn submit_form(&mut self, payload: &FormPayload) -> Result<()> {
        payload.validate()?;

        match payload {
            FormPayload::Trip(form) => {
                let id = self.store.create_trip(form)?;
                info!(trip_id = id.get(), "created trip");
            }
            FormPayload::Issue(form) => {
                let id = self.store.create_issue(form)?;
                info!(issue_id = id.get(), vehicle = %form.vehicle_no, "reported issue");
            }
            FormPayload::Vehicle(form) => {
                let id = self.store.create_vehicle(form)?;
                info!(vehicle_id = id.get(), registration = %form.registration_no, "added vehicle");
            }
            FormPayload::Job(form) => {
                let id = self.store.create_job(form)?;
                info!(job_id = id.get(), assignee = %form.assignee, "assigned job");
            }
            FormPayload::BillItem(form) => {
                self.store.add_bill_item(form)?;
                info!(item = %form.name, quantity = form.quantity, "added bill item");
            }
            FormPayload::Invoice(form) => {
                self.store.create_invoice_from_bill(form)?;
            }
            FormPayload::SupportTicket(form) => {
                let id = self.store.create_support_ticket(form)?;
                info!(ticket_id = id.get(), "opened support ticket");
            }
            FormPayload::Profile(form) => {
                self.store.update_profile(form)?;
                info!("updated profile");
            }
        }

        Ok(())
    }

    fn apply_row_action(&mut self, target: RowTarget, action: RowAction) -> Result<()> {
        match (target, action) {
            (RowTarget::Trip(id), RowAction::SetTripStatus(status)) => {
                self.store.set_trip_status(id, status)?;
            }
            (RowTarget::Issue(id), RowAction::SetIssueStatus(status)) => {
                self.store.set_issue_status(id, status)?;
            }
            (RowTarget::Invoice(id), RowAction::SetInvoiceStatus(status)) => {
                self.store.set_invoice_status(id, status)?;
            }
            (RowTarget::Job(id), RowAction::SetJobStatus(status)) => {
                self.store.set_job_status(id, status)?;
            }
            (RowTarget::BillItem(id), RowAction::RemoveBillItem) => {
                self.store.remove_bill_item(id)?;
            }
            (RowTarget::Notification(id), RowAction::DismissNotification) => {
                self.store.dismiss_notification(id)?;
            }
            (target, action) => {
                bail!(
                    "action {:?} does not apply to {target:?} -- pick an action listed for this screen",
                    action.label()
                );
            }
        }

        info!(?target, action = %action.label(), "applied row action");
        Ok(())
    }

    fn add_product_to_bill(&mut self, product: ProductId) -> Result<()> {
        self.store.add_product_to_bill(product)?;
        info!(product_id = product.get(), "added product to bill");
        Ok(())
    }

    fn sync_remote(&mut self) -> Result<String> {
        let now = self.now();
        let Some(client) = self.client.as_mut() else {
            bail!(
                "remote sync is not configured -- set [api] enabled = true in the config and retry"
            );
        };
        let report = sync_from(self.store, client, now)?;
        Ok(report.to_string())
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCount {
    pub inserted: usize,
    pub updated: usize,
}

impl SyncCount {
    #[cfg(test)]
    pub const fn new(inserted: usize, updated: usize) -> Self {
        Self { inserted, updated }
    }

    pub const fn total(self) -> usize {
        self.inserted + self.updated
    }

    fn add(&mut self, upsert: Upsert) {
        match upsert {
            Upsert::Inserted => self.inserted += 1,
            Upsert::Updated => self.updated += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub trips: SyncCount,
    pub issues: SyncCount,
    pub vehicles: SyncCount,
    pub readings: SyncCount,
    pub jobs: SyncCount,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            ("trips", self.trips),
            ("issues", self.issues),
            ("vehicles", self.vehicles),
            ("readings", self.readings),
            ("jobs", self.jobs),
        ];
        f.write_str("synced ")?;
        for (index, (label, count)) in parts.into_iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {label} ({} new)", count.total(), count.inserted)?;
        }
        Ok(())
    }
}

/// Pulls trips, issues, vehicles with their battery readings, and service
/// tasks from the backend into the store. Rows are keyed on remote codes so
/// repeated syncs update in place. An expired access token is refreshed once
/// per request.
pub fn sync_from(store: &Store, client: &mut Client, now: PrimitiveDateTime) -> Result<SyncReport> {
    let today = now.date();
    let trips = client
        .with_refresh(Client::fetch_trips)
        .context("fetch trips from backend")?;
    let issues = client
        .with_refresh(Client::fetch_issues)
        .context("fetch issues from backend")?;
    let details = client
        .with_refresh(Client::fetch_vehicle_details)
        .context("fetch vehicles from backend")?;
    let charging = client
        .with_refresh(Client::fetch_charging_stats)
        .context("fetch charging stats from backend")?;
    // Owner names only decorate vehicles, so a failed listing is not fatal.
    let owners = match client.with_refresh(Client::fetch_vehicle_owners) {
        Ok(owners) => owners,
        Err(error) => {
            warn!(error = %format!("{error:#}"), "vehicle owner listing unavailable");
            Vec::new()
        }
    };
    let services = client
        .with_refresh(Client::fetch_services)
        .context("fetch service tasks from backend")?;

    let mut report = SyncReport::default();
    for dto in trips {
        let code = dto.code();
        let form = match dto.into_trip_form(today) {
            Ok(form) => form,
            Err(error) => {
                warn!(%code, error = %format!("{error:#}"), "skipped remote trip");
                continue;
            }
        };
        let upsert = store
            .upsert_trip(&form)
            .with_context(|| format!("store remote trip {code}"))?;
        report.trips.add(upsert);
    }

    for dto in issues {
        let code = dto.code();
        let form = match dto.into_issue_form(today) {
            Ok(form) => form,
            Err(error) => {
                warn!(%code, error = %format!("{error:#}"), "skipped remote issue");
                continue;
            }
        };
        let upsert = store
            .upsert_issue(&code, &form)
            .with_context(|| format!("store remote issue {code}"))?;
        report.issues.add(upsert);
    }

    let mut known_vehicles = BTreeSet::new();
    for dto in details.vehicles {
        let code = dto.code();
        let form = match dto.into_vehicle_form(&owners) {
            Ok(form) => form,
            Err(error) => {
                warn!(%code, error = %format!("{error:#}"), "skipped remote vehicle");
                continue;
            }
        };
        let upsert = store
            .upsert_vehicle(&form)
            .with_context(|| format!("store remote vehicle {code}"))?;
        report.vehicles.add(upsert);
        known_vehicles.insert(code);
    }

    for dto in merge_vehicle_stats([details.vehicle_stats, charging]) {
        let code = dto.code();
        let form = match dto.into_reading_form(now) {
            Ok(form) => form,
            Err(error) => {
                warn!(%code, error = %format!("{error:#}"), "skipped remote battery reading");
                continue;
            }
        };
        if !known_vehicles.contains(&form.vehicle_code) {
            warn!(%code, vehicle = %form.vehicle_code, "skipped battery reading for unsynced vehicle");
            continue;
        }
        let upsert = store
            .record_battery_reading(&form)
            .with_context(|| format!("store remote battery reading {code}"))?;
        report.readings.add(upsert);
    }

    for dto in services {
        let code = dto.code();
        let form = match dto.into_job_form(now) {
            Ok(form) => form,
            Err(error) => {
                warn!(%code, error = %format!("{error:#}"), "skipped remote service task");
                continue;
            }
        };
        let upsert = store
            .upsert_job(&code, &form)
            .with_context(|| format!("store remote service task {code}"))?;
        report.jobs.add(upsert);
    }

    info!(
        trips = report.trips.total(),
        issues = report.issues.total(),
        vehicles = report.vehicles.total(),
        readings = report.readings.total(),
        jobs = report.jobs.total(),
        "synced remote records"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{DbRuntime, SyncCount, SyncReport, sync_from};
    use anyhow::{Result, anyhow};
    use fleetview_api::{Client, TokenStore};
    use fleetview_app::{
        BatteryCondition, BillItemForm, FormPayload, InvoiceForm, InvoiceStatus, JobStatus,
        LoginInput, RowAction, ScreenKind, TripStatus,
    };
    use fleetview_db::Store;
    use fleetview_testkit::{FleetFaker, reference_day, reference_now};
    use fleetview_tui::{AppRuntime, RowTarget, ScreenSnapshot};
    use std::io::Cursor;
    use std::thread;
    use std::time::Duration;
    use tiny_http::{Header, Response, Server};

    fn bootstrapped() -> Result<Store> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        Ok(store)
    }

    fn json_response(body: &str) -> Response<Cursor<Vec<u8>>> {
        Response::from_string(body).with_header(
            Header::from_bytes("Content-Type", "application/json")
                .expect("valid content type header"),
        )
    }

    const TRIPS_BODY: &str = r#"{"success":true,"message":"ok","icon":"success","data":[
        {"trip_id":1,"vehicle_id":"TN-09-EV-4582","distance":120,"efficiency":6,"running_cost":800,
         "date":"2026-01-20","start_location":"Chennai","end_location":"Vellore","duration_minutes":150,
         "status":"Completed"},
        {"trip_id":2,"vehicle_id":7,"distance":60,"efficiency":5,"running_cost":400}
    ]}"#;

    const ISSUES_BODY: &str = r#"{"success":true,"message":"ok","icon":"success","data":[
        {"issue_id":4,"vehicle_id":"TN-09-EV-4582","title":"Battery","category":"Battery",
         "description":"Cell voltage imbalance detected","date_reported":"2026-01-19",
         "priority":"High","is_resolved":false}
    ]}"#;

    const VEHICLES_BODY: &str = r#"{"success":true,"message":"ok","icon":"success","data":{
        "vehicle":[
            {"vehicle_id":3,"vehicle_model":"Mahindra XUV400","vehicle_colour":"Napoli Black",
             "registration_number":"TN09EV4582"}
        ],
        "vehicle_stats":[
            {"stats_id":1,"vehicle":3,"battery_percentage":72,"battery_health":74,"temperature":38,
             "battery_capacity":39,"estimated_range":230,"recorded_at":"2026-01-23T07:00:00Z"},
            {"stats_id":9,"vehicle":8,"battery_percentage":50,"battery_health":90,"temperature":30}
        ]}}"#;

    const CHARGING_BODY: &str = r#"{"success":true,"message":"ok","icon":"success","data":{
        "vehicle_stats":[
            {"stats_id":2,"vehicle_id":3,"battery_percentage":95,"battery_health":74,"temperature":33,
             "battery_capacity":39,"estimated_range":300,"recorded_at":"2026-01-23T08:30:00Z"}
        ]}}"#;

    const OWNERS_BODY: &str = r#"{"success":true,"message":"ok","icon":"success","data":[
        {"owner__id":5,"owner__username":"saranya","owner__email":"saranya.prasad@example.com",
         "vehicle_model":"Mahindra XUV400","vehicle_colour":"Napoli Black",
         "registration_number":"TN09EV4582"}
    ]}"#;

    const SERVICES_BODY: &str = r#"{"success":true,"message":"ok","icon":"success","data":[
        {"service_id":4,"vehicle_id":3,"serviceman__email":"tech@example.com",
         "start_time":"2026-01-23T13:00:00Z","deadline":"2026-01-23T17:00:00Z",
         "priority":"HIGH","status":"ONGOING","notes":"Battery health inspection"}
    ]}"#;

    const SYNC_ROUTES: [(&str, &str); 6] = [
        ("/api/get-trip-details/", TRIPS_BODY),
        ("/api/get-issue-details/", ISSUES_BODY),
        ("/api/get-vehicle-details/", VEHICLES_BODY),
        ("/api/get-charging-details/", CHARGING_BODY),
        ("/api/get-user-details-by-vehicle/", OWNERS_BODY),
        ("/api/get-service-details/", SERVICES_BODY),
    ];

    fn serve_sync(server: Server, rounds: usize) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for _ in 0..rounds {
                for (path, body) in SYNC_ROUTES {
                    let request = server.recv().expect("sync request expected");
                    assert_eq!(request.url(), path);
                    request
                        .respond(json_response(body))
                        .expect("response should succeed");
                }
            }
        })
    }

    #[test]
    fn submit_form_creates_trip_row() -> Result<()> {
        let store = bootstrapped()?;
        let mut runtime = DbRuntime::new(&store);

        let mut trip = FleetFaker::new(5).trip();
        trip.start_location = "Chennai".to_owned();
        trip.end_location = "Ooty".to_owned();
        runtime.submit_form(&FormPayload::Trip(trip))?;

        let trips = store.list_trips()?;
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].code, "TRIP001");
        assert_eq!(trips[0].start_location, "Chennai");
        Ok(())
    }

    #[test]
    fn submit_form_rejects_invalid_payload_before_touching_store() -> Result<()> {
        let store = bootstrapped()?;
        let mut runtime = DbRuntime::new(&store);

        let mut item = FleetFaker::new(9).bill_item();
        item.name = "  ".to_owned();
        assert!(runtime.submit_form(&FormPayload::BillItem(item)).is_err());
        assert!(store.list_bill_items()?.is_empty());
        Ok(())
    }

    #[test]
    fn invoice_form_turns_bill_into_pending_invoice() -> Result<()> {
        let store = bootstrapped()?;
        let mut runtime = DbRuntime::new(&store);

        runtime.submit_form(&FormPayload::BillItem(BillItemForm {
            name: "Battery Check".to_owned(),
            quantity: 2,
            rate_paise: 450_000,
            tax_percent: 0,
        }))?;
        let product = store.list_products()?[0].id;
        runtime.add_product_to_bill(product)?;

        runtime.submit_form(&FormPayload::Invoice(InvoiceForm {
            customer: "Ravi Teja".to_owned(),
            vehicle_no: "TN-09-EV-4582".to_owned(),
            service: "Battery Check".to_owned(),
        }))?;

        assert!(store.list_bill_items()?.is_empty());
        let invoices = store.list_invoices()?;
        let created = invoices
            .iter()
            .find(|invoice| invoice.customer == "Ravi Teja")
            .ok_or_else(|| anyhow!("invoice should exist"))?;
        assert_eq!(created.status, InvoiceStatus::Pending);
        assert!(created.amount_paise > 900_000);
        Ok(())
    }

    #[test]
    fn load_screen_returns_matching_snapshot() -> Result<()> {
        let store = bootstrapped()?;
        store.seed_demo_data(reference_day())?;
        let mut runtime = DbRuntime::new(&store);

        for screen in ScreenKind::ALL {
            let snapshot = runtime.load_screen(screen)?;
            assert_eq!(snapshot.screen(), screen);
        }

        let ScreenSnapshot::Billing { products, .. } = runtime.load_screen(ScreenKind::Billing)?
        else {
            return Err(anyhow!("billing snapshot expected"));
        };
        assert!(products.iter().any(|product| product.name == "Oil Change"));
        Ok(())
    }

    #[test]
    fn row_action_updates_trip_status() -> Result<()> {
        let store = bootstrapped()?;
        let id = store.create_trip(&FleetFaker::new(2).trip())?;
        let mut runtime = DbRuntime::new(&store);

        runtime.apply_row_action(
            RowTarget::Trip(id),
            RowAction::SetTripStatus(TripStatus::Cancelled),
        )?;
        assert_eq!(store.list_trips()?[0].status, TripStatus::Cancelled);
        Ok(())
    }

    #[test]
    fn mismatched_row_action_is_rejected() -> Result<()> {
        let store = bootstrapped()?;
        let id = store.create_trip(&FleetFaker::new(2).trip())?;
        let mut runtime = DbRuntime::new(&store);

        let error = runtime
            .apply_row_action(RowTarget::Trip(id), RowAction::DismissNotification)
            .expect_err("dismiss does not apply to trips");
        assert!(error.to_string().contains("does not apply"));
        Ok(())
    }

    #[test]
    fn page_size_is_never_zero() -> Result<()> {
        let store = bootstrapped()?;
        assert_eq!(DbRuntime::new(&store).page_size(), 5);
        assert_eq!(DbRuntime::new(&store).with_page_size(0).page_size(), 1);
        assert_eq!(DbRuntime::new(&store).with_page_size(8).page_size(), 8);
        Ok(())
    }

    #[test]
    fn sync_without_client_explains_how_to_enable_it() -> Result<()> {
        let store = bootstrapped()?;
        let mut runtime = DbRuntime::new(&store);
        let error = runtime.sync_remote().expect_err("no client configured");
        assert!(error.to_string().contains("[api] enabled = true"));
        Ok(())
    }

    #[test]
    fn sync_inserts_then_updates_remote_records() -> Result<()> {
        let server = Server::http("127.0.0.1:0")
            .map_err(|error| anyhow!("start mock server: {error}"))?;
        let addr = format!("http://{}/api", server.server_addr());
        let handle = serve_sync(server, 2);

        let store = bootstrapped()?;
        let mut client = Client::new(&addr, Duration::from_secs(1), TokenStore::memory())?;

        let first = sync_from(&store, &mut client, reference_now())?;
        assert_eq!(
            first,
            SyncReport {
                trips: SyncCount::new(2, 0),
                issues: SyncCount::new(1, 0),
                vehicles: SyncCount::new(1, 0),
                readings: SyncCount::new(2, 0),
                jobs: SyncCount::new(1, 0),
            }
        );

        let mut runtime = DbRuntime::new(&store).with_client(Some(client));
        let message = runtime.sync_remote()?;
        assert_eq!(
            message,
            "synced 2 trips (0 new), 1 issues (0 new), 1 vehicles (0 new), 2 readings (0 new), 1 jobs (0 new)"
        );

        let trips = store.list_trips()?;
        assert_eq!(trips.len(), 2);
        assert!(trips.iter().any(|trip| trip.code == "R-TRIP001"));
        let issues = store.list_issues()?;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "R-ISS-004");

        let vehicles = store.list_vehicles()?;
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].code, "R-VEH003");
        assert_eq!(vehicles[0].owner, "saranya");
        let battery = vehicles[0].battery.ok_or_else(|| anyhow!("latest reading expected"))?;
        assert_eq!(battery.charge_percent, 95);
        assert_eq!(vehicles[0].condition(), Some(BatteryCondition::Degraded));

        let jobs = store.list_jobs()?;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].code, "R-SVC004");
        assert_eq!(jobs[0].status, JobStatus::InProgress);
        assert_eq!(jobs[0].assignee, "tech@example.com");

        handle.join().map_err(|_| anyhow!("server thread panicked"))?;
        Ok(())
    }

    #[test]
    fn sync_refreshes_expired_session_and_tolerates_missing_owner_listing() -> Result<()> {
        let server = Server::http("127.0.0.1:0")
            .map_err(|error| anyhow!("start mock server: {error}"))?;
        let addr = format!("http://{}/api", server.server_addr());

        let handle = thread::spawn(move || {
            let login = server.recv().expect("login request expected");
            assert_eq!(login.url(), "/api/auth/login/");
            login
                .respond(json_response(
                    r#"{"access":"access-1","refresh":"refresh-1","email":"owner@example.com","role":"PERSONAL"}"#,
                ))
                .expect("response should succeed");

            let stale = server.recv().expect("trips request expected");
            assert_eq!(stale.url(), "/api/get-trip-details/");
            stale
                .respond(json_response(r#"{"detail":"Token expired"}"#).with_status_code(401))
                .expect("response should succeed");

            let refresh = server.recv().expect("refresh request expected");
            assert_eq!(refresh.url(), "/api/auth/refresh/");
            refresh
                .respond(json_response(r#"{"access":"access-2"}"#))
                .expect("response should succeed");

            for (path, body) in SYNC_ROUTES {
                let request = server.recv().expect("sync request expected");
                assert_eq!(request.url(), path);
                let response = if path == "/api/get-user-details-by-vehicle/" {
                    json_response(
                        r#"{"success":false,"message":"Handler method not implemented for GET request.","icon":"error"}"#,
                    )
                    .with_status_code(405)
                } else {
                    json_response(body)
                };
                request.respond(response).expect("response should succeed");
            }
        });

        let store = bootstrapped()?;
        let mut client = Client::new(&addr, Duration::from_secs(1), TokenStore::memory())?;
        client.login(&LoginInput {
            email: "owner@example.com".to_owned(),
            password: "secret".to_owned(),
        })?;

        let report = sync_from(&store, &mut client, reference_now())?;
        assert_eq!(report.trips, SyncCount::new(2, 0));
        assert_eq!(report.vehicles, SyncCount::new(1, 0));
        assert_eq!(client.tokens().access(), Some("access-2"));
        assert_eq!(store.list_vehicles()?[0].owner, "");

        handle.join().map_err(|_| anyhow!("server thread panicked"))?;
        Ok(())
    }

    #[test]
    fn submit_vehicle_form_assigns_code() -> Result<()> {
        let store = bootstrapped()?;
        let mut runtime = DbRuntime::new(&store);
        runtime.submit_form(&FormPayload::Vehicle(FleetFaker::new(8).vehicle()))?;

        let ScreenSnapshot::Vehicles(vehicles) = runtime.load_screen(ScreenKind::Vehicles)? else {
            return Err(anyhow!("vehicles snapshot expected"));
        };
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].code, "VEH001");
        Ok(())
    }
}
