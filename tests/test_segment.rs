mod common;
use common::{write_cnt, SynthChannel};
use imspeech::config::SegmentConfig;
use imspeech::evidence::EvidenceSheet;
use imspeech::config::FeatureConfig;
use imspeech::extract_features;
use imspeech::io::{load_trial, save_trial};
use imspeech::segment::{assemble_dataset, parse_trial_file_name, segment_subject, trial_file_name, Trial};
use ndarray::Array2;
use std::path::Path;

const SFREQ: u16 = 100;

fn chans() -> [SynthChannel; 4] {
    [
        SynthChannel::unit("FP1"),
        SynthChannel::unit("FP2"),
        SynthChannel::unit("EKG"),
        SynthChannel::unit("Trigger"),
    ]
}

/// Channel `c` at sample `t` holds `c·1000 + t` counts (µV).
fn write_subject(base: &Path, subject: &str, n_t: usize) {
    let dir = base.join(subject);
    std::fs::create_dir_all(&dir).unwrap();
    let raw = Array2::from_shape_fn((4, n_t), |(c, t)| (c * 1000 + t) as i16);
    write_cnt(&dir.join(format!("{subject}.cnt")), &chans(), SFREQ, &raw, 1);
}

fn evidence(path: &Path) {
    std::fs::write(
        path,
        "MM05_tag,MM05_start,MM05_stop,MM05_use,P02_tag,P02_start,P02_stop,P02_use\n\
         3,1000,2000,1,0,500,1500,1\n\
         5,3000,4000,0,10,2000,3100,1\n\
         7,5000,6500,1,4,4000,5000,1\n",
    )
    .unwrap();
}

fn cfg() -> SegmentConfig {
    SegmentConfig { notch_freqs: vec![], ..SegmentConfig::default() }
}

#[test]
fn segment_writes_one_file_per_usable_trial() {
    let tmp = tempfile::tempdir().unwrap();
    let (base, out) = (tmp.path().join("raw"), tmp.path().join("trials"));
    write_subject(&base, "MM05", 800);
    let ev = tmp.path().join("evidence.csv");
    evidence(&ev);
    let sheet = EvidenceSheet::from_path(&ev).unwrap();

    let written = segment_subject(&base, "MM05", &sheet, &cfg(), &out).unwrap();
    let names: Vec<String> = written.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
    assert_eq!(names, vec![trial_file_name("MM05", 0, 3), trial_file_name("MM05", 1, 7)]);

    let t = load_trial(&written[1]).unwrap();
    assert_eq!(parse_trial_file_name(&names[1]), Some(("MM05".to_string(), 1, 7)));
    assert_eq!(t.subject, "MM05");
    assert_eq!(t.tag, 7);
    // [500, 650] inclusive at 100 Hz
    assert_eq!(t.data.dim(), (4, 151));
    approx::assert_abs_diff_eq!(t.data[[1, 0]], (1000.0 + 500.0) * 1e-6, epsilon = 1e-9);
}

#[test]
fn segment_with_notch_keeps_trial_lengths() {
    let tmp = tempfile::tempdir().unwrap();
    let (base, out) = (tmp.path().join("raw"), tmp.path().join("trials"));
    write_subject(&base, "MM05", 800);
    let ev = tmp.path().join("evidence.csv");
    evidence(&ev);
    let sheet = EvidenceSheet::from_path(&ev).unwrap();

    let cfg = SegmentConfig { notch_freqs: vec![20.0], notch_trans_bw: 4.0, ..SegmentConfig::default() };
    let written = segment_subject(&base, "MM05", &sheet, &cfg, &out).unwrap();
    assert_eq!(load_trial(&written[0]).unwrap().data.ncols(), 101);
}

#[test]
fn missing_recording_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("raw/MM05")).unwrap();
    let ev = tmp.path().join("evidence.csv");
    evidence(&ev);
    let sheet = EvidenceSheet::from_path(&ev).unwrap();
    assert!(segment_subject(&tmp.path().join("raw"), "MM05", &sheet, &cfg(), tmp.path()).is_err());
}

#[test]
fn assemble_drops_channels_crops_and_tracks_subjects() {
    let tmp = tempfile::tempdir().unwrap();
    let (base, out) = (tmp.path().join("raw"), tmp.path().join("trials"));
    write_subject(&base, "MM05", 800);
    write_subject(&base, "P02", 600);
    let ev = tmp.path().join("evidence.csv");
    evidence(&ev);
    let sheet = EvidenceSheet::from_path(&ev).unwrap();
    for s in ["MM05", "P02"] {
        segment_subject(&base, s, &sheet, &cfg(), &out).unwrap();
    }

    let ds = assemble_dataset(&out, &cfg()).unwrap();
    // MM05: 101, 151 samples; P02: 101, 111, 101 samples
    assert_eq!(ds.x.dim(), (5, 2, 101));
    assert_eq!(ds.ch_names, vec!["FP1", "FP2"]);
    assert_eq!(ds.y.to_vec(), vec![3, 7, 0, 10, 4]);
    assert_eq!(ds.subject_range("MM05").unwrap().len(), 2);
    assert_eq!(ds.subject_range("P02").unwrap().start, 2);

    let fixed = SegmentConfig { trial_samples: Some(111), ..cfg() };
    let ds = assemble_dataset(&out, &fixed).unwrap();
    assert_eq!(ds.x.dim(), (2, 2, 111));
    assert_eq!(ds.y.to_vec(), vec![7, 10]);
}

#[test]
fn default_features_from_inclusive_five_second_trials() {
    let tmp = tempfile::tempdir().unwrap();
    let (base, out) = (tmp.path().join("raw"), tmp.path().join("trials"));
    for s in ["MM05", "P02"] {
        let dir = base.join(s);
        std::fs::create_dir_all(&dir).unwrap();
        let raw = Array2::from_shape_fn((4, 12_000), |(c, t)| ((c + 1) * (t % 97)) as i16);
        write_cnt(&dir.join("rec.cnt"), &chans(), 1000, &raw, 1);
    }
    let ev = tmp.path().join("evidence.csv");
    std::fs::write(
        &ev,
        "MM05_tag,MM05_start,MM05_stop,MM05_use,P02_tag,P02_start,P02_stop,P02_use\n\
         1,1000,6000,1,2,1000,6000,1\n\
         3,6000,11000,1,4,6000,11000,1\n",
    )
    .unwrap();
    let sheet = EvidenceSheet::from_path(&ev).unwrap();
    for s in ["MM05", "P02"] {
        segment_subject(&base, s, &sheet, &cfg(), &out).unwrap();
    }

    let ds = assemble_dataset(&out, &cfg()).unwrap();
    assert_eq!(ds.x.dim(), (4, 2, 5001));

    let fs = extract_features(&ds, Some("P02"), &FeatureConfig::default()).unwrap();
    assert_eq!(fs.train.x.dim(), (10, 2, 2));
    assert_eq!(fs.test.x.dim(), (10, 2, 2));
    assert_eq!(fs.train.y.to_vec(), vec![1, 1, 1, 1, 1, 3, 3, 3, 3, 3]);
    assert!(fs.test.x.iter().all(|v| v.is_finite()));
}

#[test]
fn assemble_orders_trials_by_index_within_subject() {
    let tmp = tempfile::tempdir().unwrap();
    for (subject, index) in [("MM05", 100), ("MM05", 9), ("MM05", 10), ("MM05", 2), ("P02", 0)] {
        let trial = Trial {
            subject: subject.to_string(),
            index,
            tag: index as u32,
            data: Array2::zeros((2, 20)),
            sfreq: 100.0,
            ch_names: vec!["FP1".into(), "FP2".into()],
        };
        save_trial(&trial, &tmp.path().join(trial_file_name(subject, index, trial.tag))).unwrap();
    }
    let ds = assemble_dataset(tmp.path(), &cfg()).unwrap();
    assert_eq!(ds.y.to_vec(), vec![2, 9, 10, 100, 0]);
    assert_eq!(ds.subject_range("MM05").unwrap().len(), 4);
}
