use crate::{
    MinuteWavWriter, WavStager, minute_file_name, parse_minute_file_name, stage_finalized,
};

use chrono::NaiveDate;

fn minute(h: u32, m: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// WHAT: Minute file names encode the aligned minute with zero seconds
/// WHY: Downstream consumers parse upload timestamps from the name
#[test]
fn given_minute_start_when_naming_then_name_round_trips() {
    let name = minute_file_name(minute(12, 7));

    assert_eq!(name, "2024-03-05 12-07-00.wav");
    assert_eq!(parse_minute_file_name(&name), Some(minute(12, 7)));
}

/// WHAT: Foreign file names are rejected by the parser
/// WHY: Stray files in the staging directory must not fake timestamps
#[test]
fn given_invalid_names_when_parsing_then_none() {
    assert_eq!(parse_minute_file_name("notes.txt"), None);
    assert_eq!(parse_minute_file_name("2024-13-05 12-07-00.wav"), None);
    assert_eq!(parse_minute_file_name(""), None);
}

/// WHAT: Same-minute timestamps do not rotate the open file
/// WHY: Exactly one file per minute, covering [start, start+60s)
#[test]
fn given_same_minute_when_updating_then_no_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = MinuteWavWriter::new(dir.path(), 48_000).unwrap();

    writer.write_chunk(&[0i16; 480], minute(12, 0)).unwrap();
    let rotated = writer.update_timestamp(minute(12, 0)).unwrap();

    assert!(rotated.is_none());
    assert_eq!(writer.current_start(), Some(minute(12, 0)));
}

/// WHAT: A newer minute closes the old file and opens the next
/// WHY: Rotation produces contiguous, gap-free minute files
#[test]
fn given_next_minute_when_updating_then_previous_file_finalized() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = MinuteWavWriter::new(dir.path(), 48_000).unwrap();

    writer.write_chunk(&[100i16; 4800], minute(12, 0)).unwrap();
    let finalized = writer.update_timestamp(minute(12, 1)).unwrap().unwrap();

    assert_eq!(finalized.start, minute(12, 0));
    assert!(finalized.path.ends_with("2024-03-05 12-00-00.wav"));
    assert!(finalized.path.exists());
    assert_eq!(writer.current_start(), Some(minute(12, 1)));

    // The finalized file reads back as valid PCM.
    let reader = hound::WavReader::open(&finalized.path).unwrap();
    assert_eq!(reader.spec().sample_rate, 48_000);
    assert_eq!(reader.len(), 4800);
}

/// WHAT: Force rotation closes the stalled file immediately
/// WHY: The 63s watchdog must recover from IO stalls and clock jumps
#[test]
fn given_stalled_file_when_forcing_rotation_then_new_minute_opens() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = MinuteWavWriter::new(dir.path(), 48_000).unwrap();

    writer.write_chunk(&[0i16; 480], minute(12, 0)).unwrap();

    // Clock has jumped to 12:01:05 without a natural rotation.
    let finalized = writer.force_rotate(minute(12, 1)).unwrap().unwrap();

    assert!(finalized.path.ends_with("2024-03-05 12-00-00.wav"));
    assert_eq!(writer.current_start(), Some(minute(12, 1)));
}

/// WHAT: Closing finalizes the last file exactly once
/// WHY: Shutdown must flush the current WAV and leave nothing open
#[test]
fn given_open_file_when_closing_then_finalized_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = MinuteWavWriter::new(dir.path(), 48_000).unwrap();

    writer.write_chunk(&[0i16; 480], minute(12, 0)).unwrap();

    assert!(writer.close().unwrap().is_some());
    assert!(writer.close().unwrap().is_none());
}

/// WHAT: Staging moves the finalized file out of the construct directory
/// WHY: Only staged files are visible to the uploader and the watchdog
#[test]
fn given_finalized_wav_when_staging_then_construct_file_removed() {
    let construct = tempfile::tempdir().unwrap();
    let audio = tempfile::tempdir().unwrap();
    let mut writer = MinuteWavWriter::new(construct.path(), 48_000).unwrap();

    writer.write_chunk(&[0i16; 480], minute(12, 0)).unwrap();
    let finalized = writer.close().unwrap().unwrap();

    let staged = stage_finalized(&WavStager, &finalized, audio.path()).unwrap();

    assert!(staged.exists());
    assert!(staged.ends_with("2024-03-05 12-00-00.wav"));
    assert!(!finalized.path.exists());
}
