use heatshed::command::Command;
use heatshed::persistence::{
    CommandStore, HistoryRange, JsonCommandStore, JsonStatisticsStore, StatisticsRow,
    StatisticsStore,
};

fn row(start: i64) -> StatisticsRow {
    StatisticsRow {
        start,
        off1: 10,
        off2: 0,
        off3: 0,
        int1: 12,
        int2: 8,
        int3: 4,
        watts: 2400,
        meter: 3100,
    }
}

#[test]
fn missing_command_file_is_seeded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("commands.json");

    let store = JsonCommandStore::open(&path).unwrap();
    assert!(path.exists());
    let rows = store.all().unwrap();
    assert_eq!(rows.len(), 24);
    assert!(rows.iter().all(|r| r.command == Command::Off));
}

#[test]
fn command_updates_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("commands.json");

    let mut store = JsonCommandStore::open(&path).unwrap();
    store.set_all(Command::Eco).unwrap();
    store.set_command(17, Command::FrostGuard).unwrap();

    let reopened = JsonCommandStore::open(&path).unwrap();
    let rows = reopened.all().unwrap();
    let seventeen = rows.iter().find(|r| r.id == 17).unwrap();
    assert_eq!((seventeen.phase, seventeen.wire), (3, 1));
    assert_eq!(seventeen.command, Command::FrostGuard);
    assert_eq!(rows.iter().filter(|r| r.command == Command::Eco).count(), 23);
}

#[test]
fn unknown_id_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("commands.json");
    let mut store = JsonCommandStore::open(&path).unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    assert!(store.set_command(42, Command::On).is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn commands_are_stored_as_hardware_codes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("commands.json");
    let mut store = JsonCommandStore::open(&path).unwrap();
    store.set_command(1, Command::Eco).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json[0]["command"], 3);
    assert_eq!(json[1]["command"], 1);
}

#[test]
fn statistics_rows_are_appended_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("statistics.json");

    let mut store = JsonStatisticsStore::open(&path).unwrap();
    assert!(store.since(None).unwrap().is_empty());
    store.append(row(3_000)).unwrap();
    store.append(row(1_000)).unwrap();
    store.append(row(2_000)).unwrap();

    let reopened = JsonStatisticsStore::open(&path).unwrap();
    let starts: Vec<i64> = reopened.since(None).unwrap().iter().map(|r| r.start).collect();
    assert_eq!(starts, vec![1_000, 2_000, 3_000]);
    let recent: Vec<i64> = reopened
        .since(Some(2_000))
        .unwrap()
        .iter()
        .map(|r| r.start)
        .collect();
    assert_eq!(recent, vec![2_000, 3_000]);
}

#[test]
fn history_range_names() {
    assert_eq!("24h".parse::<HistoryRange>().unwrap(), HistoryRange::Day);
    assert_eq!("7j".parse::<HistoryRange>().unwrap(), HistoryRange::Week);
    assert_eq!("7days".parse::<HistoryRange>().unwrap(), HistoryRange::Week);
    assert_eq!("1m".parse::<HistoryRange>().unwrap(), HistoryRange::Month);
    assert_eq!("12m".parse::<HistoryRange>().unwrap(), HistoryRange::Year);
    assert_eq!("inf".parse::<HistoryRange>().unwrap(), HistoryRange::All);
    assert_eq!("fortnight".parse::<HistoryRange>().unwrap(), HistoryRange::All);
}
