mod common;
use common::{write_cnt, SynthChannel};
use imspeech::cnt::open_cnt;
use imspeech::segment::Recording;
use ndarray::Array2;

fn counts(n_ch: usize, n_t: usize) -> Array2<i16> {
    Array2::from_shape_fn((n_ch, n_t), |(c, t)| (c as i16 + 1) * 100 - t as i16)
}

#[test]
fn header_fields_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("rec.cnt");
    let chans = [SynthChannel::unit("FP1"), SynthChannel::unit("FP2"), SynthChannel::unit("EKG")];
    write_cnt(&p, &chans, 1000, &counts(3, 50), 1);

    let cnt = open_cnt(&p).unwrap();
    assert_eq!(cnt.n_chan(), 3);
    assert_eq!(cnt.ch_names(), vec!["FP1", "FP2", "EKG"]);
    assert_eq!(cnt.sfreq, 1000.0);
    assert_eq!(cnt.n_samples, 50);
    assert_eq!(cnt.sample_bytes, 2);
    approx::assert_abs_diff_eq!(cnt.duration_secs(), 0.05);
}

#[test]
fn multiplexed_samples_are_calibrated_to_volts() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("rec.cnt");
    let raw = counts(2, 40);
    write_cnt(&p, &[SynthChannel::unit("C3"), SynthChannel::unit("C4")], 500, &raw, 1);

    let data = open_cnt(&p).unwrap().read_all_data().unwrap();
    assert_eq!(data.dim(), (2, 40));
    for ((c, t), &v) in data.indexed_iter() {
        approx::assert_abs_diff_eq!(v, raw[[c, t]] as f64 * 1e-6, epsilon = 1e-12);
    }
}

#[test]
fn baseline_and_gain_applied_per_channel() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("rec.cnt");
    let chans = [
        SynthChannel { name: "CZ", baseline: 10, sensitivity: 204.8, calib: 2.0 },
        SynthChannel { name: "PZ", baseline: -5, sensitivity: 102.4, calib: 1.0 },
    ];
    let raw = Array2::from_shape_fn((2, 4), |(c, t)| (t as i16) * if c == 0 { 1 } else { -1 });
    write_cnt(&p, &chans, 250, &raw, 1);

    let data = open_cnt(&p).unwrap().read_all_data().unwrap();
    approx::assert_abs_diff_eq!(data[[0, 3]], (3.0 - 10.0) * 2.0 * 1e-6, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(data[[1, 2]], (-2.0 + 5.0) * 0.5 * 1e-6, epsilon = 1e-12);
}

#[test]
fn block_interleaved_layout_matches_multiplexed() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (dir.path().join("mux.cnt"), dir.path().join("blk.cnt"));
    let raw = counts(3, 37);
    let chans = || [SynthChannel::unit("O1"), SynthChannel::unit("O2"), SynthChannel::unit("OZ")];
    write_cnt(&a, &chans(), 1000, &raw, 1);
    write_cnt(&b, &chans(), 1000, &raw, 8);

    let blk = open_cnt(&b).unwrap();
    assert_eq!(blk.block_samples, 8);
    assert_eq!(open_cnt(&a).unwrap().read_all_data().unwrap(), blk.read_all_data().unwrap());
}

#[test]
fn recording_from_cnt_is_f32_volts() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("rec.cnt");
    write_cnt(&p, &[SynthChannel::unit("T7")], 1000, &counts(1, 10), 1);
    let rec = Recording::from_cnt(&p).unwrap();
    assert_eq!(rec.ch_names, vec!["T7"]);
    assert_eq!(rec.n_samples(), 10);
    approx::assert_abs_diff_eq!(rec.data[[0, 0]], 100e-6_f32, epsilon = 1e-9);
}
