//! Integration tests for the pipeline runner.
//!
//! These tests use SQLite in-memory databases and a real staging layout on
//! disk to test end to end scenarios of the loader, bypassing the network
//! stages.

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::config::STAGING_DIR;
    use crate::db::{ConnectionConfig, Db};
    use crate::runner::{run_ingest, IngestArgs};

    // ============ Test Helpers ============

    /// Write one monthly trip CSV into the staging layout.
    fn stage_csv(root: &Path, group: &str, filename: &str, num_rows: usize) {
        let dir = root.join(STAGING_DIR).join(group);
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = std::fs::File::create(dir.join(filename)).unwrap();
        writeln!(file, "ride_id,started_at,ended_at,member_casual").unwrap();
        for i in 0..num_rows {
            writeln!(
                file,
                "{group}-ride{i},2020-01-{:02} 08:00:00,2020-01-{:02} 08:15:00,member",
                1 + i % 28,
                1 + i % 28
            )
            .unwrap();
        }
    }

    fn test_args(download_dir: &Path, db: Db) -> IngestArgs {
        IngestArgs {
            connection: ConnectionConfig {
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                host: "localhost".to_string(),
                port: 5432,
            },
            database: "citibike".to_string(),
            table_name: None,
            url: None,
            download_dir: download_dir.to_path_buf(),
            chunk_rows: 4,
            backfill: None,
            upload: None,
            test_db: Some(db),
            skip_fetch: true,
        }
    }

    // ============ Tests ============

    #[tokio::test]
    async fn staged_files_load_into_per_group_tables() {
        let dir = TempDir::new().unwrap();
        stage_csv(dir.path(), "202001", "202001-citibike-tripdata.csv", 10);
        stage_csv(dir.path(), "202003", "202003-citibike-tripdata.csv", 3);
        let db = Db::sqlite_in_memory().await.unwrap();

        let report = run_ingest(test_args(dir.path(), db.clone())).await.unwrap();

        assert_eq!(
            report.tables_loaded,
            vec!["citibike_202001", "citibike_202003"]
        );
        assert_eq!(report.stats.files_loaded, 2);
        assert_eq!(report.stats.rows_loaded, 13);
        assert_eq!(db.count_rows("citibike_202001").await.unwrap(), 10);
        assert_eq!(db.count_rows("citibike_202003").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn multiple_files_in_one_group_each_replace_the_table() {
        // Later files in the same group overwrite earlier ones; the table
        // ends up holding the last file's rows.
        let dir = TempDir::new().unwrap();
        stage_csv(dir.path(), "202001", "202001-citibike-tripdata_1.csv", 6);
        stage_csv(dir.path(), "202001", "202001-citibike-tripdata_2.csv", 2);
        let db = Db::sqlite_in_memory().await.unwrap();

        let report = run_ingest(test_args(dir.path(), db.clone())).await.unwrap();

        assert_eq!(report.stats.files_loaded, 2);
        assert_eq!(db.count_rows("citibike_202001").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rerunning_the_pipeline_does_not_duplicate_rows() {
        let dir = TempDir::new().unwrap();
        stage_csv(dir.path(), "202001", "202001-citibike-tripdata.csv", 7);
        let db = Db::sqlite_in_memory().await.unwrap();

        run_ingest(test_args(dir.path(), db.clone())).await.unwrap();
        run_ingest(test_args(dir.path(), db.clone())).await.unwrap();

        assert_eq!(db.count_rows("citibike_202001").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn table_override_applies_to_a_single_staged_file() {
        let dir = TempDir::new().unwrap();
        stage_csv(dir.path(), "202001", "202001-citibike-tripdata.csv", 4);
        let db = Db::sqlite_in_memory().await.unwrap();

        let mut args = test_args(dir.path(), db.clone());
        args.table_name = Some("trips_custom".to_string());
        let report = run_ingest(args).await.unwrap();

        assert_eq!(report.tables_loaded, vec!["trips_custom"]);
        assert_eq!(db.count_rows("trips_custom").await.unwrap(), 4);
        assert!(!db.table_exists("citibike_202001").await.unwrap());
    }

    #[tokio::test]
    async fn table_override_is_rejected_for_multiple_staged_files() {
        let dir = TempDir::new().unwrap();
        stage_csv(dir.path(), "202001", "202001-citibike-tripdata.csv", 1);
        stage_csv(dir.path(), "202002", "202002-citibike-tripdata.csv", 1);
        let db = Db::sqlite_in_memory().await.unwrap();

        let mut args = test_args(dir.path(), db);
        args.table_name = Some("trips_custom".to_string());
        let err = run_ingest(args).await.unwrap_err();

        assert!(err.to_string().contains("single file"));
    }

    #[tokio::test]
    async fn empty_staging_layout_is_a_successful_noop() {
        let dir = TempDir::new().unwrap();
        let db = Db::sqlite_in_memory().await.unwrap();

        let report = run_ingest(test_args(dir.path(), db)).await.unwrap();

        assert!(report.tables_loaded.is_empty());
        assert_eq!(report.stats.files_loaded, 0);
        assert_eq!(report.stats.rows_loaded, 0);
    }

    #[tokio::test]
    async fn zipped_archive_flows_through_extract_locate_and_load() {
        let dir = TempDir::new().unwrap();
        let archive_dir = dir.path().join(crate::config::ARCHIVE_DIR);
        std::fs::create_dir_all(&archive_dir).unwrap();

        let archive =
            crate::fetch::RemoteArchiveRef::new("https://host/JC-202001-citibike-tripdata.csv.zip");
        let zip_path = archive_dir.join(archive.file_name());
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(
                "JC-202001-citibike-tripdata.csv",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer
            .write_all(
                b"ride_id,started_at,ended_at,member_casual\n\
                  a,2020-01-01 00:00:01,2020-01-01 00:10:02,member\n\
                  b,2020-01-02 09:30:00,2020-01-02 09:45:00,casual\n",
            )
            .unwrap();
        writer.finish().unwrap();

        let staging_dir = dir
            .path()
            .join(STAGING_DIR)
            .join(archive.staging_group());
        crate::fetch::extract_archive(&zip_path, &staging_dir).unwrap();

        let db = Db::sqlite_in_memory().await.unwrap();
        let report = run_ingest(test_args(dir.path(), db.clone())).await.unwrap();

        assert_eq!(report.tables_loaded, vec!["citibike_202001"]);
        assert_eq!(db.count_rows("citibike_202001").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn report_serializes_with_flattened_stats() {
        let dir = TempDir::new().unwrap();
        stage_csv(dir.path(), "202001", "202001-citibike-tripdata.csv", 2);
        let db = Db::sqlite_in_memory().await.unwrap();

        let report = run_ingest(test_args(dir.path(), db)).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert!(json.get("job_id").is_some());
        assert_eq!(json["files_loaded"], 1);
        assert_eq!(json["rows_loaded"], 2);
        assert!(json.get("duration_secs").is_some());
    }
}
