use chrono::{NaiveDate, NaiveTime};

use ward_ops_report::aggregate::{
    Dimension, GroupKey, KeyContext, KeyPart, Mode, RecordFilter, aggregate,
};
use ward_ops_report::changes::{ROUTE_IDENTITY, RouteMatrix};
use ward_ops_report::error::IngestError;
use ward_ops_report::ingest::coerce::{DateStyle, excel_serial_to_time, parse_date};
use ward_ops_report::ingest::records::{KycRecord, PoiRecord, QrMasterRecord, ScanRecord};
use ward_ops_report::ingest::table::RawTable;
use ward_ops_report::ingest::{Normalized, normalize, normalize_with};
use ward_ops_report::metrics::KycGapReport;
use ward_ops_report::output::tables;
use ward_ops_report::qr_status::{QrStatusReport, ScanStatus};
use ward_ops_report::reference::{ReferenceData, ResolveOptions, Resolver, UNASSIGNED};
use ward_ops_report::session::ReportSession;

const REFERENCE: &str = r#"{
    "supervisors": [
        {"empId": "CT01", "name": "Asha Verma", "mobile": "9000000001", "department": "C&T", "ward": "1, 2", "zonal": "Ravi Kumar"},
        {"empId": "CT02", "name": "Mohan Lal", "mobile": "9000000002", "department": "C&T", "ward": "10,49", "zonal": "Ravi Kumar"},
        {"empId": "KT01", "name": "Float Team", "mobile": "", "department": "KYC Team", "ward": "N/A", "zonal": "Neha Singh"}
    ],
    "wards": [
        {"number": "1", "name": "Birjapur"},
        {"number": "2", "name": "Atas"},
        {"number": "10", "name": "Gandhi Nagar"},
        {"number": "49", "name": "Daimpiriyal Nagar"}
    ],
    "zoneAliases": {"1": "City Zone", "2": "Civil Lines"},
    "wardTargets": {"1": 100, "2": 200}
}"#;

const ROUTE_LOG: &str = "\
Ward Name,Route Name,Vehicle Number,Zone & Circle,Date,Total POI,Covered,Not Covered,Coverage %
1-Birjapur,R-01,UP85 AB 1001,1,01-12-2025,40,30,10,75
01-Birjapur,R-01,UP85 AB 1001,1,02-12-2025,40,44,0,110
1-Birjapur,R-01,UP85 AB 2002,1,03-12-2025,40,20,20,50
2-Atas,R-02,UP85 AB 3003,1,01-12-2025,50,0,50,0
2-Atas,R-02,UP85 AB 3003,1,2025-12-03,50,25,25,50
77-Nowhere,R-77,UP85 AB 7007,2,03/12/2025,10,5,5,50
,R-99,UP85 AB 9999,2,03-12-2025,10,5,5,50
49-Daimpiriyal Nagar,R-49,UP85 AB 4904,2,not a date,20,10,10,50
";

const VEHICLE_LOG: &str = "\
Ward Name,Route Name,Vehicle Number,Date,Total POI,Covered
2-Atas,R-02,A,01-12-2025,10,5
2-Atas,R-02,A,02-12-2025,10,5
2-Atas,R-02,B,03-12-2025,10,5
2-Atas,R-02,B,04-12-2025,10,5
2-Atas,R-02,A,05-12-2025,10,5
10-Gandhi Nagar,R-10,C,01-12-2025,10,5
10-Gandhi Nagar,R-10,C,02-12-2025,10,5
10-Gandhi Nagar,R-10,D,04-12-2025,10,5
10-Gandhi Nagar,R-10,C,05-12-2025,10,5
";

fn reference() -> ReferenceData {
    ReferenceData::from_json(REFERENCE).expect("reference data parses")
}

fn upload(csv: &str) -> Normalized<PoiRecord> {
    let table = RawTable::from_csv_str(csv).expect("upload parses");
    normalize::<PoiRecord>(&table).expect("upload normalizes")
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
}

#[test]
fn test_upload_counts_admitted_and_dropped_rows() {
    let loaded = upload(ROUTE_LOG);
    assert_eq!(loaded.report.total_rows, 8);
    assert_eq!(loaded.report.admitted, 7);
    assert_eq!(loaded.report.dropped, 1);
    assert!(loaded.report.missing_columns.is_empty());

    let undated = loaded.records.iter().filter(|r| r.date.is_none()).count();
    assert_eq!(undated, 1);
}

#[test]
fn test_every_admitted_row_reaches_a_bucket() {
    let loaded = upload(ROUTE_LOG);
    let data = reference();
    let options = ResolveOptions::default();
    let ctx = KeyContext::new(Some(Resolver::new(&data)), &options);

    let by_supervisor = aggregate(
        &loaded.records,
        &[Dimension::Supervisor],
        Mode::Cumulative,
        &RecordFilter::default(),
        &ctx,
    );
    let entries: usize = by_supervisor.buckets.iter().map(|b| b.entry_count).sum();
    assert_eq!(entries, loaded.report.admitted);

    let unassigned = by_supervisor
        .get(&GroupKey::single(KeyPart::text(UNASSIGNED)))
        .expect("unmatched wards stay visible");
    assert_eq!(unassigned.entry_count, 1);
    assert!(unassigned.wards.contains("77-Nowhere"));

    let asha = by_supervisor
        .get(&GroupKey::single(KeyPart::text("Asha Verma")))
        .unwrap();
    assert_eq!(asha.entry_count, 5);
}

#[test]
fn test_displayed_coverage_is_bounded_but_sums_are_not() {
    let loaded = upload(ROUTE_LOG);
    let options = ResolveOptions::default();
    let ctx = KeyContext::new(None, &options);
    let by_ward = aggregate(
        &loaded.records,
        &[Dimension::Ward],
        Mode::Cumulative,
        &RecordFilter::default(),
        &ctx,
    );

    let birjapur = by_ward
        .get(&GroupKey::single(KeyPart::text("1-Birjapur")))
        .unwrap();
    assert_eq!(birjapur.entry_count, 3);
    assert_eq!(birjapur.total_scheduled, 120.0);

    let by_date = aggregate(
        &loaded.records,
        &[Dimension::Date, Dimension::Ward],
        Mode::Cumulative,
        &RecordFilter::default(),
        &ctx,
    );
    let over = by_date
        .get(&GroupKey(vec![KeyPart::Date(day(2)), KeyPart::text("1-Birjapur")]))
        .unwrap();
    assert_eq!(over.total_covered, 44.0);
    assert_eq!(over.total_scheduled, 40.0);
    assert_eq!(over.display_coverage(), 100.0);

    let table = tables::aggregation_table(&by_date, DateStyle::DayMonthYear);
    let col = table.headers.iter().position(|h| h == "Coverage %").unwrap();
    for row in &table.rows {
        let shown: f64 = row[col].parse().unwrap();
        assert!((0.0..=100.0).contains(&shown));
    }
    assert_eq!(table.rows.last().unwrap()[0], tables::GRAND_TOTAL);
}

#[test]
fn test_latest_snapshot_ignores_text_order_of_dates() {
    let loaded = upload(ROUTE_LOG);
    let options = ResolveOptions::default();
    let ctx = KeyContext::new(None, &options);
    let snapshot = aggregate(
        &loaded.records,
        &[Dimension::Ward],
        Mode::LatestSnapshot,
        &RecordFilter::default(),
        &ctx,
    );

    assert_eq!(snapshot.snapshot_date, Some(day(3)));
    assert_eq!(snapshot.totals.entry_count, 3);
    let wards: Vec<String> = snapshot.buckets.iter().map(|b| b.key.0[0].to_string()).collect();
    assert_eq!(wards, vec!["1-Birjapur", "2-Atas", "77-Nowhere"]);
}

#[test]
fn test_filters_apply_before_grouping() {
    let loaded = upload(ROUTE_LOG);
    let options = ResolveOptions::default();
    let ctx = KeyContext::new(None, &options);
    let filter = RecordFilter {
        from: Some(day(2)),
        to: Some(day(3)),
        wards: vec!["1".to_string()],
    };
    let by_date = aggregate(&loaded.records, &[Dimension::Date], Mode::Cumulative, &filter, &ctx);

    assert_eq!(by_date.totals.entry_count, 2);
    assert_eq!(by_date.buckets[0].key, GroupKey::single(KeyPart::Date(day(2))));
    assert_eq!(by_date.totals.total_covered, 64.0);
}

#[test]
fn test_rendered_dates_normalize_to_themselves() {
    let loaded = upload(ROUTE_LOG);
    for record in &loaded.records {
        let Some(date) = record.date else { continue };
        for style in [DateStyle::Iso, DateStyle::DayMonthYear] {
            let rendered = style.format(date);
            assert_eq!(parse_date(&rendered), Some(date));
            let again = style.format(parse_date(&rendered).unwrap());
            assert_eq!(again, rendered);
        }
    }
}

#[test]
fn test_vehicle_changes_end_to_end() {
    let loaded = upload(VEHICLE_LOG);
    let data = reference();
    let matrix = RouteMatrix::build(
        &loaded.records,
        &RecordFilter::default(),
        Some(Resolver::new(&data)),
        &ResolveOptions::default(),
    );

    assert_eq!(matrix.axis.len(), 5);
    let atas = &matrix.routes[0];
    assert_eq!(atas.history.route_name, "R-02");
    assert_eq!(atas.history.supervisor, "Asha Verma");
    assert_eq!(atas.summary.change_count, 3);

    let gandhi = &matrix.routes[1];
    assert_eq!(gandhi.history.zonal_head, "Ravi Kumar");
    assert!(!gandhi.history.per_date.contains_key(&day(3)));
    assert_eq!(gandhi.summary.change_count, 2);

    let first = matrix.day_totals.get(&day(1)).unwrap();
    assert_eq!(first.total, 20.0);
    assert_eq!(first.covered, 10.0);
    assert_eq!(matrix.with_min_changes(3).len(), 1);

    let table = tables::route_matrix_table(&matrix, 0, DateStyle::DayMonthYear);
    assert_eq!(table.value(1, "03-12-2025"), Some(""));
    assert_eq!(table.value(1, "Changes"), Some("2"));
}

#[test]
fn test_route_log_changes_skip_blank_vehicles_and_merge_ward_spellings() {
    let csv = format!("{ROUTE_LOG}1-Birjapur,R-01,,1,04-12-2025,40,0,40,0\n");
    let table = RawTable::from_csv_str(&csv).unwrap();
    let loaded = normalize_with::<PoiRecord>(&table, ROUTE_IDENTITY).unwrap();
    assert_eq!(loaded.report.dropped, 2);

    let matrix = RouteMatrix::build(
        &loaded.records,
        &RecordFilter::default(),
        None,
        &ResolveOptions::default(),
    );
    let birjapur = matrix
        .routes
        .iter()
        .find(|r| r.history.route_name == "R-01")
        .unwrap();
    assert_eq!(birjapur.history.ward, "1-Birjapur");
    assert_eq!(birjapur.history.per_date.len(), 3);
    assert_eq!(birjapur.summary.change_count, 1);
    assert_eq!(birjapur.summary.unique_vehicles.len(), 2);
}

#[test]
fn test_excel_serial_time_is_timezone_independent() {
    let two_pm = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
    assert_eq!(excel_serial_to_time(45849.5833333333), Some(two_pm));

    let master = "QR Code ID,Ward,Zone & Circle,Building/Street,Site Name,Type\n\
        QR-1,1-Birjapur,1,Main Road,Market Gate,Dustbin\n";
    let scans = "QR Code ID,Date Of Scan,Supervisor Name,Before Clean Time,After Clean Time\n\
        QR-1,45849,Asha,45849.5833333333,45849.6041666667\n";

    let master = normalize::<QrMasterRecord>(&RawTable::from_csv_str(master).unwrap()).unwrap();
    let scans = normalize::<ScanRecord>(&RawTable::from_csv_str(scans).unwrap()).unwrap();
    assert_eq!(scans.records[0].before_time, Some(two_pm));

    let data = reference();
    let report =
        QrStatusReport::build(&master.records, &scans.records, &Resolver::new(&data), None);
    assert_eq!(report.rows[0].status, ScanStatus::Scanned);
    assert_eq!(report.rows[0].time_difference().as_deref(), Some("30m"));
    assert_eq!(report.rows[0].zone, "City Zone");
}

#[test]
fn test_ward_spellings_resolve_to_one_supervisor() {
    let data = reference();
    let resolver = Resolver::new(&data);
    let options = ResolveOptions::default();

    let ids: Vec<Option<String>> = ["01-Birjapur", "1-Birjapur", "1", "Birjapur"]
        .iter()
        .map(|raw| {
            resolver
                .resolve_ward(raw, &options)
                .supervisor()
                .map(|s| s.employee_id.clone())
        })
        .collect();
    assert!(ids.iter().all(|id| id.as_deref() == Some("CT01")));
    assert!(!resolver.resolve_ward("77-Nowhere", &options).is_matched());
}

#[test]
fn test_simulation_restores_the_upload_exactly() {
    let mut session = ReportSession::from(upload(ROUTE_LOG));
    let uploaded = session.records().to_vec();

    let outcome = session
        .simulate_coverage(&RecordFilter::default(), 0.9)
        .expect("coverage is below target");
    assert!(outcome.after_percent > outcome.before_percent);
    assert!(session.is_simulated());
    assert_ne!(session.records(), uploaded.as_slice());
    for record in session.records() {
        assert!(record.covered <= record.total);
    }

    assert!(session.restore());
    assert_eq!(session.records(), uploaded.as_slice());
    assert!(!session.is_simulated());
}

#[test]
fn test_kyc_gap_keeps_negative_gaps() {
    let csv = "Ward No,Customer Count\n1,120\n02,50\n77,5\n";
    let loaded = normalize::<KycRecord>(&RawTable::from_csv_str(csv).unwrap()).unwrap();
    let report = KycGapReport::build(&loaded.records, &reference());

    assert_eq!(report.rows[0].ward_number, "1");
    assert_eq!(report.rows[0].metrics.gap, -20.0);
    assert_eq!(report.rows[0].metrics.coverage_percent, 120.0);
    assert_eq!(report.rows[1].metrics.gap, 150.0);
    assert_eq!(report.unassigned, 5.0);

    let table = tables::kyc_gap_table(&report);
    assert_eq!(table.value(0, "Gap"), Some("-20"));
    assert_eq!(table.value(2, "Ward No"), Some(UNASSIGNED));
    assert_eq!(table.value(3, "Target"), Some("300"));
}

#[test]
fn test_unusable_uploads_are_rejected_whole() {
    let no_ward = "Route Name,Total POI,Covered\nR1,10,5\n";
    let table = RawTable::from_csv_str(no_ward).unwrap();
    assert!(matches!(
        normalize::<PoiRecord>(&table),
        Err(IngestError::MissingColumn(_))
    ));

    let pdf = std::env::temp_dir().join("ward_ops_report_upload.pdf");
    assert!(matches!(
        RawTable::from_path(&pdf),
        Err(IngestError::UnsupportedFormat(_))
    ));
}
