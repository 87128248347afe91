use arrow::array::{Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use common::Error;
use common::config::{Settings, WriteMode};
use datafusion::prelude::*;
use datalake::processor::{JobReport, ParquetTableStore, StarTable, TableStore, register_udfs};
use datalake::services::DataLakeService;
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn write_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, lines.join("\n")).unwrap();
}

fn song(song_id: &str, title: &str, artist_id: &str, artist_name: &str, year: i64) -> String {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": null,
        "artist_longitude": null,
        "artist_location": "",
        "artist_name": artist_name,
        "song_id": song_id,
        "title": title,
        "duration": 148.03546,
        "year": year
    })
    .to_string()
}

fn event(page: &str, user_id: &str, level: &str, song: &str, ts: i64) -> String {
    json!({
        "artist": "The Box Tops",
        "auth": "Logged In",
        "firstName": "Ryan",
        "gender": "M",
        "itemInSession": 0,
        "lastName": "Smith",
        "length": 148.03546,
        "level": level,
        "location": "San Jose-Sunnyvale-Santa Clara, CA",
        "method": "PUT",
        "page": page,
        "registration": 1541016707796.0,
        "sessionId": 583,
        "song": song,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
        "userId": user_id
    })
    .to_string()
}

/// Two songs, one log file with a matched play, an unmatched play, a login
/// and a broken line.
fn seed_input(root: &Path) {
    write_lines(
        &root.join("song_data/A/A/A/TRAAAAK128F9318786.json"),
        &[song("SOCIWDW12A8C13D406", "Soul Deep", "ARMJAGH1187FB546F3", "The Box Tops", 1969)],
    );
    write_lines(
        &root.join("song_data/A/B/C/TRABCEI128F424C983.json"),
        &[song("SOMZWCG12A8C13C480", "I Didn't Mean To", "ARD7TVE1187B99BFB1", "Casual", 0)],
    );

    let mut log = vec![
        event("NextSong", "26", "free", "Soul Deep", 1541890800000),
        event("NextSong", "26", "paid", "Does not exist", 1541903636796),
        event("Login", "", "free", "", 1541903700000),
    ];
    log.push("{\"page\": \"NextSong\"".to_string());
    write_lines(&root.join("log_data/2018/11/2018-11-10-events.json"), &log);
}

fn settings(input: &Path, output: &Path, write_mode: WriteMode) -> Settings {
    let mut settings = Settings::with_roots(
        &input.display().to_string(),
        &output.display().to_string(),
    );
    settings.write_mode = write_mode;
    settings
}

async fn run(settings: Settings) -> common::Result<JobReport> {
    DataLakeService::new(settings).await?.run().await
}

async fn read_table(output: &Path, table: StarTable) -> DataFrame {
    let ctx = SessionContext::new();
    register_udfs(&ctx).unwrap();
    let store = ParquetTableStore::new(Arc::new(ctx), WriteMode::ErrorIfExists);
    let path = format!("{}/{}/", output.display(), table.directory());
    store.read_table(table, &path).await.unwrap()
}

async fn column(df: &DataFrame, name: &str, data_type: DataType) -> Vec<Option<String>> {
    let mut values = Vec::new();
    for batch in df.clone().select_columns(&[name]).unwrap().collect().await.unwrap() {
        let array = cast(batch.column(0), &data_type).unwrap();
        let array = cast(&array, &DataType::Utf8).unwrap();
        let array = array.as_any().downcast_ref::<StringArray>().unwrap();
        for i in 0..array.len() {
            values.push(array.is_valid(i).then(|| array.value(i).to_string()));
        }
    }
    values.sort();
    values
}

/// Every row of `df` rendered as text, columns in declared order, sorted.
async fn rows(df: &DataFrame) -> Vec<String> {
    let mut rows = Vec::new();
    for batch in df.clone().collect().await.unwrap() {
        let columns: Vec<_> = batch
            .columns()
            .iter()
            .map(|column| cast(column, &DataType::Utf8).unwrap())
            .collect();
        for i in 0..batch.num_rows() {
            let row: Vec<String> = columns
                .iter()
                .map(|column| {
                    let column = column.as_any().downcast_ref::<StringArray>().unwrap();
                    if column.is_valid(i) {
                        column.value(i).to_string()
                    } else {
                        "NULL".to_string()
                    }
                })
                .collect();
            rows.push(row.join("|"));
        }
    }
    rows.sort();
    rows
}

fn parquet_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(parquet_files(&path));
        } else if path.extension().is_some_and(|ext| ext == "parquet") {
            files.push(path);
        }
    }
    files
}

#[tokio::test]
async fn test_end_to_end_local_run() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed_input(input.path());

    let report = run(settings(input.path(), output.path(), WriteMode::ErrorIfExists))
        .await
        .unwrap();

    assert_eq!(report.song_files, 2);
    assert_eq!(report.log_files, 1);
    assert_eq!(report.song_records, 2);
    assert_eq!(report.log_records, 3);
    assert_eq!(report.skipped_log_lines, 1);
    assert_eq!(report.play_events, 2);
    assert_eq!(report.unmatched_plays, 1);
    assert_eq!(report.untimed_plays, 0);
    assert_eq!(report.rows_written(StarTable::Songs), Some(2));
    assert_eq!(report.rows_written(StarTable::Artists), Some(2));
    assert_eq!(report.rows_written(StarTable::Users), Some(2));
    assert_eq!(report.rows_written(StarTable::Time), Some(2));
    assert_eq!(report.rows_written(StarTable::Songplays), Some(1));

    let out = output.path();
    assert!(out.join("songs_table/year=1969/artist_id=ARMJAGH1187FB546F3").is_dir());
    assert!(out.join("songs_table/year=0/artist_id=ARD7TVE1187B99BFB1").is_dir());
    assert!(out.join("time_table/year=2018/month=11").is_dir());
    assert!(out.join("songplays_table/year=2018/month=11").is_dir());
    for table in StarTable::ALL {
        assert!(out.join(table.directory()).join("_SUCCESS").is_file(), "{}", table);
    }

    let songplays = read_table(out, StarTable::Songplays).await;
    assert_eq!(
        column(&songplays, "song_id", DataType::Utf8).await,
        vec![Some("SOCIWDW12A8C13D406".to_string())]
    );
    assert_eq!(
        column(&songplays, "artist_id", DataType::Utf8).await,
        vec![Some("ARMJAGH1187FB546F3".to_string())]
    );
    assert_eq!(
        column(&songplays, "user_id", DataType::Utf8).await,
        vec![Some("26".to_string())]
    );

    let time = read_table(out, StarTable::Time).await;
    assert_eq!(
        column(&time, "weekday", DataType::Utf8).await,
        vec![Some("Saturday".to_string()), Some("Sunday".to_string())]
    );
    assert_eq!(
        column(&time, "hour", DataType::Int32).await,
        vec![Some("2".to_string()), Some("23".to_string())]
    );

    let users = read_table(out, StarTable::Users).await;
    assert_eq!(
        column(&users, "level", DataType::Utf8).await,
        vec![Some("free".to_string()), Some("paid".to_string())]
    );
}

#[tokio::test]
async fn test_parquet_files_carry_table_metadata() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed_input(input.path());

    run(settings(input.path(), output.path(), WriteMode::ErrorIfExists))
        .await
        .unwrap();

    let files = parquet_files(&output.path().join("songplays_table"));
    assert!(!files.is_empty());
    for file in files {
        let reader = SerializedFileReader::new(fs::File::open(&file).unwrap()).unwrap();
        let metadata = reader.metadata().file_metadata();
        let key_values = metadata.key_value_metadata().unwrap();
        let lookup = |key: &str| {
            key_values
                .iter()
                .find(|kv| kv.key == key)
                .and_then(|kv| kv.value.clone())
        };
        assert_eq!(lookup("datalake.table"), Some("songplays".to_string()));
        assert_eq!(lookup("datalake.partition_columns"), Some("year,month".to_string()));

        let columns: Vec<_> = metadata
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert!(!columns.contains(&"year".to_string()));
        assert!(!columns.contains(&"month".to_string()));
    }
}

#[tokio::test]
async fn test_rerun_with_overwrite_is_stable() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed_input(input.path());

    let dimensions = [
        StarTable::Songs,
        StarTable::Artists,
        StarTable::Users,
        StarTable::Time,
    ];

    let first = run(settings(input.path(), output.path(), WriteMode::Overwrite))
        .await
        .unwrap();
    let mut before = Vec::new();
    for table in dimensions {
        before.push(rows(&read_table(output.path(), table).await).await);
    }

    let second = run(settings(input.path(), output.path(), WriteMode::Overwrite))
        .await
        .unwrap();
    for (table, before) in dimensions.into_iter().zip(before) {
        let after = rows(&read_table(output.path(), table).await).await;
        assert!(!after.is_empty(), "{}", table);
        assert_eq!(before, after, "{}", table);
    }

    for table in StarTable::ALL {
        assert_eq!(first.rows_written(table), second.rows_written(table), "{}", table);
    }

    let songplays = read_table(output.path(), StarTable::Songplays).await;
    assert_eq!(songplays.clone().count().await.unwrap(), 1);
    assert_eq!(
        column(&songplays, "start_time", DataType::Int64).await,
        vec![Some("1541890800000".to_string())]
    );
}

#[tokio::test]
async fn test_rerun_without_overwrite_collides() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed_input(input.path());

    run(settings(input.path(), output.path(), WriteMode::ErrorIfExists))
        .await
        .unwrap();
    let err = run(settings(input.path(), output.path(), WriteMode::ErrorIfExists))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PathCollision(_)));
}

#[tokio::test]
async fn test_empty_log_tree_writes_empty_tables() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_lines(
        &input.path().join("song_data/A/A/A/TRAAAAK128F9318786.json"),
        &[song("SOCIWDW12A8C13D406", "Soul Deep", "ARMJAGH1187FB546F3", "The Box Tops", 1969)],
    );

    let report = run(settings(input.path(), output.path(), WriteMode::ErrorIfExists))
        .await
        .unwrap();

    assert_eq!(report.log_files, 0);
    assert_eq!(report.rows_written(StarTable::Songs), Some(1));
    assert_eq!(report.rows_written(StarTable::Users), Some(0));
    assert_eq!(report.rows_written(StarTable::Songplays), Some(0));
    assert_eq!(report.unmatched_plays, 0);
}
