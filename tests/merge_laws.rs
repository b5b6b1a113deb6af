use loadtest_report::report::consumer::{Emitter, SampleConsumer};
use loadtest_report::report::filter::{label_predicate, FilterConsumer};
use loadtest_report::{Sample, StatCalculator};
use proptest::prelude::*;

fn calculator(values: &[i64]) -> StatCalculator {
    let mut stats = StatCalculator::new();
    for (i, v) in values.iter().enumerate() {
        stats.add_sample(&Sample::new("p", i as i64 * 10, *v, v % 7 != 0));
    }
    stats
}

fn fingerprint(stats: &StatCalculator) -> (u64, u64, u64, Option<i64>, Option<i64>, Vec<i64>) {
    (
        stats.count(),
        stats.error_count(),
        stats.sum(),
        stats.min(),
        stats.max(),
        [50.0, 90.0, 99.0].iter().map(|p| stats.percentile(*p)).collect(),
    )
}

fn filter_pass(filter: &mut FilterConsumer, samples: &[Sample]) -> Vec<Sample> {
    let mut out = Emitter::new();
    for sample in samples {
        filter.consume(sample, 0, &mut out);
    }
    out.into_samples()
}

proptest! {
    #[test]
    fn merge_is_commutative(
        a in prop::collection::vec(0i64..100_000, 0..200),
        b in prop::collection::vec(0i64..100_000, 0..200),
    ) {
        let mut ab = calculator(&a);
        ab.merge(&calculator(&b));
        let mut ba = calculator(&b);
        ba.merge(&calculator(&a));
        prop_assert_eq!(fingerprint(&ab), fingerprint(&ba));
    }

    #[test]
    fn merge_is_associative(
        a in prop::collection::vec(0i64..100_000, 0..100),
        b in prop::collection::vec(0i64..100_000, 0..100),
        c in prop::collection::vec(0i64..100_000, 0..100),
    ) {
        let mut left = calculator(&a);
        left.merge(&calculator(&b));
        left.merge(&calculator(&c));

        let mut bc = calculator(&b);
        bc.merge(&calculator(&c));
        let mut right = calculator(&a);
        right.merge(&bc);

        prop_assert_eq!(fingerprint(&left), fingerprint(&right));
    }

    #[test]
    fn merged_partitions_match_single_pass(
        values in prop::collection::vec(0i64..100_000, 1..300),
        split in 0usize..300,
    ) {
        let split = split.min(values.len());
        let mut merged = calculator(&values[..split]);
        merged.merge(&calculator(&values[split..]));
        let whole = calculator(&values);
        prop_assert_eq!(merged.count(), whole.count());
        prop_assert_eq!(merged.sum(), whole.sum());
        prop_assert_eq!(merged.min(), whole.min());
        prop_assert_eq!(merged.max(), whole.max());
        prop_assert_eq!(merged.percentile(95.0), whole.percentile(95.0));
    }

    #[test]
    fn filtering_twice_equals_filtering_once(
        labels in prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d"]), 0..100),
    ) {
        let samples: Vec<Sample> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| Sample::new(*l, i as i64, 5, true))
            .collect();
        let excluded = vec!["b".to_string(), "d".to_string()];
        let mut first = FilterConsumer::new("f1", label_predicate(&[], &excluded).unwrap());
        let mut second = FilterConsumer::new("f2", label_predicate(&[], &excluded).unwrap());

        let once = filter_pass(&mut first, &samples);
        let twice = filter_pass(&mut second, &once);
        prop_assert_eq!(&once, &twice);
        prop_assert!(once.iter().all(|s| s.label() != "b" && s.label() != "d"));
    }
}
