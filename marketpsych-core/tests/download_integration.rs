//! End-to-end downloads against the in-memory transport.

use chrono::{NaiveDate, NaiveDateTime};
use marketpsych_core::data::{
    download, plan, DownloadOutcome, FetchError, Fetcher, MemoryConnector, NoProgress, Output,
    Plan, RemoteFile, RmaSchema, RmaTable,
};
use marketpsych_core::{
    AssetClass, Bucket, DownloadRequest, Frequency, MissingFilePolicy, OutputMode, Period,
    RequestParams, Source, Template,
};
use std::io::{Cursor, Write};

const FEED_DIR: &str = "/mrn-mi-w/PRO/MI4/CUR/WDAI_UDAI";
const HEADER: &str = "id\tassetCode\twindowTimestamp\tdataType\tsystemVersion\tbuzz\tsentiment\n";
/// One file per day in the `daily` folder, without listing it.
const DATED: &str = "{prefix}/{asset_class}/{frequency}/daily/MI4.{asset_class}.{frequency}.DAILY.{date}.txt";

fn daily_path(day: &str) -> String {
    format!("{FEED_DIR}/daily/MI4.CUR.WDAI_UDAI.DAILY.{day}.txt")
}

/// One file's worth of rows: every asset from every source at `hours`.
fn rows(day: &str, hours: &[u32], assets: &[&str]) -> String {
    let mut s = String::from(HEADER);
    for hour in hours {
        for asset in assets {
            for (j, dt) in ["News", "Social", "News_Social"].iter().enumerate() {
                s.push_str(&format!(
                    "{asset}{hour}{j}\t{asset}\t{day}T{hour:02}:00:00.000Z\t{dt}\tMPTRXR_2_0\t{hour}.5\t0.{}\n",
                    j + 1
                ));
            }
        }
    }
    s
}

fn three_days() -> MemoryConnector {
    MemoryConnector::new()
        .with_file(daily_path("2023-01-01"), rows("2023-01-01", &[0], &["EUR", "JPY"]))
        .with_file(daily_path("2023-01-02"), rows("2023-01-02", &[0], &["EUR", "JPY"]))
        .with_file(daily_path("2023-01-03"), rows("2023-01-03", &[0], &["EUR", "JPY"]))
}

fn currency_params(sources: &[&str]) -> RequestParams {
    let mut params = RequestParams::new("CURRENCY", "DAILY", "2023-01-01", Some("2023-01-03"));
    params.sources = sources.iter().map(|s| s.to_string()).collect();
    params
}

fn dated_params() -> RequestParams {
    let mut params = currency_params(&[]);
    params.template = Some(DATED.into());
    params
}

fn files_of(outcome: DownloadOutcome) -> Vec<std::path::PathBuf> {
    match outcome.output {
        Output::Files(files) => files,
        other => panic!("expected files, got {other:?}"),
    }
}

fn table_of(outcome: DownloadOutcome) -> RmaTable {
    outcome.output.into_table().expect("table output")
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
}

fn is_sorted(ts: &[NaiveDateTime]) -> bool {
    ts.windows(2).all(|w| w[0] <= w[1])
}

// ── Selection ────────────────────────────────────────────────────────

#[test]
fn three_days_three_paths_one_table() {
    let conn = three_days();
    let params = currency_params(&[]);
    let request = params.to_request().unwrap();
    assert_eq!(
        plan(&request).unwrap(),
        Plan::Listing {
            dirs: ["monthly", "daily", "minutely"]
                .iter()
                .map(|b| format!("{FEED_DIR}/{b}"))
                .collect()
        }
    );
    let dated = dated_params().to_request().unwrap();
    assert_eq!(
        plan(&dated).unwrap().paths(),
        vec![daily_path("2023-01-01"), daily_path("2023-01-02"), daily_path("2023-01-03")]
    );

    let outcome = download(&conn, &params, &NoProgress).unwrap();
    assert!(outcome.all_succeeded());
    assert_eq!(outcome.report.selected, 3);
    assert_eq!(outcome.report.fetched, 3);

    let table = table_of(outcome);
    assert_eq!(table.len(), 18);
    let ts: Vec<NaiveDateTime> = table.records().iter().map(|r| r.timestamp).collect();
    assert!(is_sorted(&ts));
    let days: Vec<NaiveDate> = {
        let mut d: Vec<NaiveDate> = ts.iter().map(|t| t.date()).collect();
        d.dedup();
        d
    };
    assert_eq!(days, vec![day(1), day(2), day(3)]);

    assert_eq!(conn.connections_opened(), 1);
    assert_eq!(conn.connections_open(), 0);
}

#[test]
fn inverted_period_fails_before_connecting() {
    let conn = three_days();
    let params = RequestParams::new("CUR", "WDAI_UDAI", "2023-01-03", Some("2023-01-01"));
    let err = download(&conn, &params, &NoProgress).unwrap_err();
    assert!(matches!(err, FetchError::Configuration(_)));
    assert!(!err.is_retryable());
    assert_eq!(conn.connections_opened(), 0);
}

#[test]
fn unknown_bucket_fails_before_connecting() {
    let conn = three_days();
    let err = download(&conn, &currency_params(&["nonexistent-bucket"]), &NoProgress).unwrap_err();
    assert!(matches!(err, FetchError::Configuration(_)));
    assert!(err.to_string().contains("nonexistent-bucket"));
    assert_eq!(conn.connections_opened(), 0);
    assert_eq!(conn.reads(), 0);
}

#[test]
fn unknown_enums_and_templates_fail_before_connecting() {
    let conn = three_days();
    let cases = [
        RequestParams::new("GOLD", "DAILY", "2023-01-01", None),
        RequestParams::new("CUR", "WEEKLY", "2023-01-01", None),
        RequestParams::new("CUR", "DAILY", "yesterday", None),
        RequestParams {
            template: Some("{prefix}/{ticker}.txt".into()),
            ..RequestParams::new("CUR", "DAILY", "2023-01-01", None)
        },
    ];
    for params in &cases {
        assert!(matches!(
            download(&conn, params, &NoProgress),
            Err(FetchError::Configuration(_))
        ));
    }
    assert_eq!(conn.connections_opened(), 0);
}

#[test]
fn source_filter_is_not_a_bucket() {
    let conn = three_days();
    let mut params = currency_params(&[]);
    params.buckets = vec!["News".into()];
    let err = download(&conn, &params, &NoProgress).unwrap_err();
    assert!(err.to_string().contains("monthly, daily, minutely"), "{err}");
    assert_eq!(conn.connections_opened(), 0);
}

#[test]
fn unfiltered_is_superset_of_filtered() {
    let conn = three_days();
    let all = table_of(download(&conn, &currency_params(&[]), &NoProgress).unwrap());
    let social = table_of(download(&conn, &currency_params(&["social"]), &NoProgress).unwrap());
    let both = table_of(download(&conn, &currency_params(&["News", "Social"]), &NoProgress).unwrap());

    assert_eq!(social.len(), 6);
    assert_eq!(both.len(), 12);
    assert!(social.records().iter().all(|r| r.data_type() == Some("Social")));
    for r in both.records() {
        assert!(all.records().contains(r));
    }
}

#[test]
fn default_layout_searches_every_bucket_folder() {
    let conn = three_days().with_file(
        format!("{FEED_DIR}/monthly/MI4.CUR.WDAI_UDAI.MONTHLY.2023-01.txt"),
        rows("2023-01-15", &[0], &["GBP"]),
    );
    let all = download(&conn, &currency_params(&[]), &NoProgress).unwrap();
    assert_eq!(all.report.selected, 4);
    assert!(all.all_succeeded());
    assert_eq!(table_of(all).len(), 21);

    let mut params = currency_params(&[]);
    params.buckets = vec!["daily".into()];
    let daily = download(&conn, &params, &NoProgress).unwrap();
    assert_eq!(daily.report.selected, 3);
    let daily = table_of(daily);
    assert_eq!(daily.len(), 18);
    assert!(daily.records().iter().all(|r| r.asset_code != "GBP"));
}

#[test]
fn layout_is_detected_from_the_home_folder() {
    let conn = MemoryConnector::new()
        .with_file("README.txt", "hello")
        .with_file(
            "CUR/WDAI_UDAI/daily/MI4.CUR.WDAI_UDAI.DAILY.2023-01-02.txt",
            rows("2023-01-02", &[0], &["EUR"]),
        )
        .with_file(
            "CUR/WDAI_UDAI/daily/MI4.CUR.WDAI_UDAI.DAILY.2023-02-02.txt",
            rows("2023-02-02", &[0], &["EUR"]),
        );
    let mut params = currency_params(&[]);
    params.template = Some(String::new());
    let outcome = download(&conn, &params, &NoProgress).unwrap();
    assert_eq!(outcome.report.selected, 1);
    assert_eq!(table_of(outcome).len(), 3);
    assert_eq!(conn.connections_opened(), 1);
}

#[test]
fn undetectable_layout_is_an_error() {
    let conn = MemoryConnector::new().with_file("stuff/x.txt", "x");
    let mut params = currency_params(&[]);
    params.template = Some(String::new());
    let err = download(&conn, &params, &NoProgress).unwrap_err();
    assert!(matches!(err, FetchError::Layout(_)));
    assert_eq!(conn.connections_open(), 0);
}

#[test]
fn rows_are_sorted_whatever_the_file_order() {
    // Rows inside each file run backwards and days overlap.
    let conn = MemoryConnector::new()
        .with_file(daily_path("2023-01-01"), rows("2023-01-02", &[23, 5, 1], &["EUR"]))
        .with_file(daily_path("2023-01-02"), rows("2023-01-01", &[20, 10], &["EUR"]))
        .with_file(daily_path("2023-01-03"), rows("2023-01-03", &[2], &["EUR"]));
    let table = table_of(download(&conn, &currency_params(&[]), &NoProgress).unwrap());
    let ts: Vec<NaiveDateTime> = table.records().iter().map(|r| r.timestamp).collect();
    assert_eq!(ts.len(), 18);
    assert!(is_sorted(&ts));
    assert_eq!(ts[0].date(), day(1));
}

#[test]
fn hourly_files_per_hour() {
    let dir = "/mrn-mi-w/PRO/MI4/CUR/WDAI_UHOU/daily";
    let conn = MemoryConnector::new()
        .with_file(format!("{dir}/MI4.CUR.WDAI_UHOU.2023-01-01-1300.txt"), rows("2023-01-01", &[13], &["EUR"]))
        .with_file(format!("{dir}/MI4.CUR.WDAI_UHOU.2023-01-01-1400.txt"), rows("2023-01-01", &[14], &["EUR"]))
        .with_file(format!("{dir}/MI4.CUR.WDAI_UHOU.2023-01-01-1500.txt"), rows("2023-01-01", &[15], &["EUR"]));
    let params = RequestParams::new("CUR", "HOURLY", "2023-01-01-1300", Some("2023-01-01-1459"));
    let outcome = download(&conn, &params, &NoProgress).unwrap();
    assert_eq!(outcome.report.selected, 2);
    assert_eq!(table_of(outcome).len(), 6);
}

// ── Failures ─────────────────────────────────────────────────────────

#[test]
fn rejected_credentials_abort() {
    let conn = three_days().rejecting_credentials();
    let err = download(&conn, &currency_params(&[]), &NoProgress).unwrap_err();
    assert!(matches!(err, FetchError::Authentication(_)));
    assert!(err.is_retryable());
    assert_eq!(conn.reads(), 0);
}

#[test]
fn unreachable_host_is_network_error() {
    let conn = three_days().unreachable();
    let err = download(&conn, &currency_params(&[]), &NoProgress).unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
}

#[test]
fn auth_failure_mid_batch_aborts_and_releases_session() {
    let conn = three_days().deny_read(daily_path("2023-01-02"));
    let err = download(&conn, &currency_params(&[]), &NoProgress).unwrap_err();
    assert!(matches!(err, FetchError::Authentication(_)));
    assert_eq!(conn.reads(), 1, "third file must not be fetched");
    assert_eq!(conn.connections_opened(), 1);
    assert_eq!(conn.connections_open(), 0);
}

#[test]
fn missing_files_are_skipped_by_default() {
    let conn = MemoryConnector::new()
        .with_file(daily_path("2023-01-01"), rows("2023-01-01", &[0], &["EUR"]))
        .with_file(daily_path("2023-01-03"), rows("2023-01-03", &[0], &["EUR"]));
    let outcome = download(&conn, &dated_params(), &NoProgress).unwrap();
    assert!(!outcome.all_succeeded());
    assert_eq!(outcome.report.missing, vec![daily_path("2023-01-02")]);
    assert_eq!(table_of(outcome).len(), 6);
}

#[test]
fn missing_files_fail_when_strict() {
    let conn = MemoryConnector::new()
        .with_file(daily_path("2023-01-01"), rows("2023-01-01", &[0], &["EUR"]));
    let mut params = dated_params();
    params.missing = MissingFilePolicy::Fail;
    match download(&conn, &params, &NoProgress) {
        Err(FetchError::NotFound { path }) => assert_eq!(path, daily_path("2023-01-02")),
        other => panic!("expected not found, got {other:?}"),
    }
    assert_eq!(conn.connections_open(), 0);
}

#[test]
fn empty_listing_fails_when_strict() {
    let conn = MemoryConnector::new()
        .with_file(daily_path("2022-12-31"), rows("2022-12-31", &[0], &["EUR"]));
    let mut params = currency_params(&[]);
    params.missing = MissingFilePolicy::Fail;
    match download(&conn, &params, &NoProgress) {
        Err(FetchError::NotFound { path }) => assert!(path.contains(&format!("{FEED_DIR}/daily"))),
        other => panic!("expected not found, got {other:?}"),
    }
    assert_eq!(conn.reads(), 0);
    assert_eq!(conn.connections_open(), 0);
}

#[test]
fn malformed_file_does_not_abort_siblings() {
    let conn = three_days().with_file(daily_path("2023-01-02"), "assetCode\tsentiment\nEUR\tx\n");
    let outcome = download(&conn, &currency_params(&[]), &NoProgress).unwrap();
    assert_eq!(outcome.report.fetched, 3);
    assert_eq!(outcome.report.failures.len(), 1);
    let (path, err) = &outcome.report.failures[0];
    assert_eq!(path, &daily_path("2023-01-02"));
    assert!(matches!(err, FetchError::Parse { .. }));

    let table = table_of(outcome);
    assert_eq!(table.len(), 12);
    assert!(table.records().iter().all(|r| r.timestamp.date() != day(2)));
}

#[test]
fn empty_selection_is_skipped_by_default() {
    let conn = MemoryConnector::new();
    let request = DownloadRequest::new(
        AssetClass::Cur,
        Frequency::WdaiUdai,
        Period::parse("2023-01-01", Some("2023-01-03")).unwrap(),
    );
    let outcome = Fetcher::new(&conn).download(&request, &NoProgress).unwrap();
    assert_eq!(outcome.report.selected, 0);
    assert!(!outcome.all_succeeded());
    assert_eq!(outcome.report.missing.len(), 3);
    assert!(table_of(outcome).is_empty());
}

// ── Output modes ─────────────────────────────────────────────────────

#[test]
fn disk_and_memory_outputs_agree() {
    let conn = three_days();
    let in_memory = table_of(download(&conn, &currency_params(&[]), &NoProgress).unwrap());
    let dir = tempfile::tempdir().unwrap();

    let mut params = currency_params(&[]);
    params.output = OutputMode::Directory(dir.path().join("files"));
    let files = files_of(download(&conn, &params, &NoProgress).unwrap());
    assert_eq!(files.len(), 3);
    assert_eq!(
        files[0],
        dir.path().join("files").join("MI4.CUR.WDAI_UDAI.DAILY.2023-01-01.txt")
    );
    let from_dir = RmaTable::concat(files.iter().map(|f| {
        RmaTable::parse(&f.display().to_string(), &std::fs::read(f).unwrap()).unwrap()
    }));
    assert_eq!(from_dir, in_memory);

    let single = dir.path().join("all/cur.txt");
    params.output = OutputMode::File(single.clone());
    download(&conn, &params, &NoProgress).unwrap();
    let from_file = RmaTable::parse("cur.txt", &std::fs::read(&single).unwrap()).unwrap();
    assert_eq!(from_file, in_memory);
}

#[test]
fn filtered_disk_output_matches_filtered_table() {
    let conn = three_days();
    let in_memory = table_of(download(&conn, &currency_params(&["News_Social"]), &NoProgress).unwrap());

    let dir = tempfile::tempdir().unwrap();
    let mut params = currency_params(&["News_Social"]);
    params.output = OutputMode::File(dir.path().join("cur.tsv"));
    download(&conn, &params, &NoProgress).unwrap();
    let from_file =
        RmaTable::parse("cur.tsv", &std::fs::read(dir.path().join("cur.tsv")).unwrap()).unwrap();
    assert_eq!(from_file, in_memory);
    assert_eq!(from_file.len(), 6);
}

#[test]
fn same_file_name_in_dated_folders_stays_apart() {
    let conn = MemoryConnector::new()
        .with_file(format!("{FEED_DIR}/2023-01-01/rma.txt"), rows("2023-01-01", &[0], &["EUR"]))
        .with_file(format!("{FEED_DIR}/2023-01-02/rma.txt"), rows("2023-01-02", &[0], &["EUR"]))
        .with_file(format!("{FEED_DIR}/2023-01-03/rma.txt"), rows("2023-01-03", &[0], &["EUR"]));
    let mut params = currency_params(&[]);
    params.template = Some("{prefix}/{asset_class}/{frequency}/{date}/rma.txt".into());
    let in_memory = table_of(download(&conn, &params, &NoProgress).unwrap());

    let dir = tempfile::tempdir().unwrap();
    params.output = OutputMode::Directory(dir.path().to_path_buf());
    let outcome = download(&conn, &params, &NoProgress).unwrap();
    assert!(outcome.report.failures.is_empty());
    let files = files_of(outcome);
    assert_eq!(
        files,
        ["2023-01-01", "2023-01-02", "2023-01-03"]
            .iter()
            .map(|d| dir.path().join(d).join("rma.txt"))
            .collect::<Vec<_>>()
    );
    let from_dir = RmaTable::concat(files.iter().map(|f| {
        RmaTable::parse(&f.display().to_string(), &std::fs::read(f).unwrap()).unwrap()
    }));
    assert_eq!(from_dir.len(), 9);
    assert_eq!(from_dir, in_memory);
}

#[test]
fn added_column_keeps_file_and_table_in_step() {
    let wider = "id\tassetCode\twindowTimestamp\tdataType\tsystemVersion\tbuzz\tsentiment\tfear\n\
                 x\tJPY\t2023-01-02T06:00:00.000Z\tNews\tMPTRXR_2_0\t1.5\t0.2\t0.9\n";
    let conn = MemoryConnector::new()
        .with_file(daily_path("2023-01-01"), rows("2023-01-01", &[0], &["EUR"]))
        .with_file(daily_path("2023-01-02"), wider);
    let in_memory = table_of(download(&conn, &currency_params(&[]), &NoProgress).unwrap());
    assert_eq!(in_memory.len(), 4);

    let dir = tempfile::tempdir().unwrap();
    let mut params = currency_params(&[]);
    params.output = OutputMode::File(dir.path().join("cur.txt"));
    let outcome = download(&conn, &params, &NoProgress).unwrap();
    assert!(outcome.report.failures.is_empty());
    let from_file =
        RmaTable::parse("cur.txt", &std::fs::read(dir.path().join("cur.txt")).unwrap()).unwrap();
    assert_eq!(from_file, in_memory);
}

#[test]
fn parquet_output_is_a_valid_frame() {
    use polars::prelude::*;

    let conn = three_days();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cur.parquet");
    let mut params = currency_params(&[]);
    params.output = OutputMode::File(path.clone());
    let outcome = download(&conn, &params, &NoProgress).unwrap();
    assert!(matches!(outcome.output, Output::File(ref p) if p == &path));

    let df = ParquetReader::new(std::fs::File::open(&path).unwrap())
        .finish()
        .unwrap();
    assert_eq!(df.height(), 18);
    RmaSchema::validate(&df).unwrap();
}

#[test]
fn list_output_stats_without_reading() {
    let conn = three_days();
    let mut params = currency_params(&[]);
    params.output = OutputMode::List;
    let outcome = download(&conn, &params, &NoProgress).unwrap();
    let listing = match outcome.output {
        Output::Listing(files) => files,
        other => panic!("expected listing, got {other:?}"),
    };
    assert_eq!(listing.len(), 3);
    assert_eq!(
        listing[0],
        RemoteFile {
            path: daily_path("2023-01-01"),
            size: rows("2023-01-01", &[0], &["EUR", "JPY"]).len() as u64,
        }
    );
    assert_eq!(conn.reads(), 0);
}

// ── Listing mode ─────────────────────────────────────────────────────

fn zipped(name: &str, body: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(name, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(body.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

#[test]
fn trial_listing_with_zipped_files() {
    let dir = "/mrn-mi-w/PRO/MI4/TRIAL/CUR/WDAI_UDAI/daily";
    let conn = MemoryConnector::new()
        .with_file(
            format!("{dir}/MI4.CUR.WDAI_UDAI.2023-01-02.txt.zip"),
            zipped("MI4.CUR.WDAI_UDAI.2023-01-02.txt", &rows("2023-01-02", &[0], &["EUR"])),
        )
        .with_file(
            format!("{dir}/MI4.CUR.WDAI_UDAI.2023-01-01.txt.zip"),
            zipped("MI4.CUR.WDAI_UDAI.2023-01-01.txt", &rows("2023-01-01", &[0], &["EUR"])),
        )
        .with_file(
            format!("{dir}/MI4.CUR.WDAI_UDAI.2023-02-01.txt.zip"),
            zipped("MI4.CUR.WDAI_UDAI.2023-02-01.txt", &rows("2023-02-01", &[0], &["EUR"])),
        );

    let out = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(
        AssetClass::Cur,
        Frequency::WdaiUdai,
        Period::parse("2023-01", None).unwrap(),
    )
    .template(Template::default())
    .trial(true)
    .buckets(vec![Bucket::Daily])
    .sources(vec![Source::News])
    .output(OutputMode::Directory(out.path().to_path_buf()));

    let outcome = Fetcher::new(&conn).download(&request, &NoProgress).unwrap();
    assert_eq!(outcome.report.selected, 2);
    let files = match outcome.output {
        Output::Files(files) => files,
        other => panic!("expected files, got {other:?}"),
    };
    let names: Vec<String> = files
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["MI4.CUR.WDAI_UDAI.2023-01-01.txt", "MI4.CUR.WDAI_UDAI.2023-01-02.txt"]
    );
    let first = RmaTable::parse("f", &std::fs::read(&files[0]).unwrap()).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first.records()[0].data_type(), Some("News"));
}
