use imspeech::config::FeatureConfig;
use imspeech::dataset::{labels_to_onehot, split_by_ranges, LabeledSet};
use imspeech::io::{load_dataset, save_dataset};
use imspeech::dataset::{Dataset, SubjectRange};
use ndarray::{Array1, Array3};
use rand::{rngs::StdRng, SeedableRng};

#[test]
fn onehot_is_valid_encoding() {
    let labels = Array1::from_iter((0..110u32).map(|i| i % 11));
    let oh = labels_to_onehot(&labels, 11).unwrap();
    for (row, &l) in oh.rows().into_iter().zip(labels.iter()) {
        assert_eq!(row.iter().filter(|&&v| v == 1.0).count(), 1);
        assert_eq!(row.iter().filter(|&&v| v == 0.0).count(), 10);
        assert_eq!(row[l as usize], 1.0);
    }
}

#[test]
fn default_ranges_split_993_trials() {
    let x = Array3::<f32>::zeros((993, 2, 4));
    let y = Array1::from_iter((0..993u32).map(|i| i % 11));
    let cfg = FeatureConfig::default();
    let sp = split_by_ranges(&x, &y, &cfg.train_ranges, &cfg.test_ranges).unwrap();
    assert_eq!(sp.train.len(), 361 + 501);
    assert_eq!(sp.test.len(), 131);
    assert_eq!(sp.test.y[0], 361 % 11);
}

#[test]
fn sampling_draws_from_the_set() {
    let set = LabeledSet::new(Array3::from_shape_fn((5, 2, 2), |(n, _, _)| n as f32), Array1::from(vec![0, 1, 2, 3, 4])).unwrap();
    let s = set.sample(&mut StdRng::seed_from_u64(11), 64).unwrap();
    for (obs, &l) in s.x.outer_iter().zip(s.y.iter()) {
        assert_eq!(obs[[0, 0]], l as f32);
    }
}

#[test]
fn dataset_file_roundtrip_keeps_subject_table() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("dataset.safetensors");
    let ds = Dataset {
        x: Array3::from_shape_fn((3, 2, 5), |(n, c, t)| (n * 10 + c * 5 + t) as f32),
        y: Array1::from(vec![1, 7, 10]),
        subjects: vec![
            SubjectRange { name: "MM05".into(), start: 0, stop: 2 },
            SubjectRange { name: "P02".into(), start: 2, stop: 3 },
        ],
        ch_names: vec!["FP1".into(), "FP2".into()],
        sfreq: 1000.0,
    };
    save_dataset(&ds, &p).unwrap();
    let back = load_dataset(&p).unwrap();
    assert_eq!(back.x, ds.x);
    assert_eq!(back.y, ds.y);
    assert_eq!(back.subjects, ds.subjects);
    assert_eq!(back.ch_names, ds.ch_names);
    assert_eq!(back.subject_range("P02").unwrap().len(), 1);
}
