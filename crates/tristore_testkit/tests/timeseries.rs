//! Time-series conformance across backends.

use tristore_core::{CoreError, RangeQuery, Value};
use tristore_testkit::{for_each_backend, TestStores};

fn strings(points: Vec<(i64, Value)>) -> Vec<(i64, String)> {
    points
        .into_iter()
        .map(|(t, v)| (t, v.as_text().unwrap_or_default().to_string()))
        .collect()
}

fn expected(pairs: &[(i64, &str)]) -> Vec<(i64, String)> {
    pairs.iter().map(|(t, v)| (*t, v.to_string())).collect()
}

#[test]
fn range_missing_and_remove() {
    for_each_backend(|stores| {
        let store = stores.open(TestStores::config().frozen(false).default_freq(10)).unwrap();
        let ts = store.timeseries();

        assert!(ts.range("test", RangeQuery::new()).unwrap().is_empty());
        assert!(ts.range("test", RangeQuery::between(100, 150)).unwrap().is_empty());
        assert_eq!(
            ts.missing("test", 100, Some(150), None).unwrap(),
            vec![100, 110, 120, 130, 140, 150]
        );
        assert!(!ts.is_complete("test", 100, Some(150), None).unwrap());

        ts.extend("test", (0..6).map(|i| (100 + 10 * i, i.to_string()))).unwrap();
        assert_eq!(ts.first("test").unwrap(), Some((100, Value::from("0"))));
        assert_eq!(ts.last("test").unwrap(), Some((150, Value::from("5"))));
        assert!(ts.is_complete("test", 100, Some(150), None).unwrap());

        assert_eq!(
            strings(ts.range("test", RangeQuery::new().limit(2)).unwrap()),
            expected(&[(100, "0"), (110, "1")])
        );
        assert_eq!(
            strings(ts.range("test", RangeQuery::between(130, 150).limit(1)).unwrap()),
            expected(&[(130, "3")])
        );
        assert_eq!(
            strings(ts.range("test", RangeQuery::new().start(130)).unwrap()),
            expected(&[(130, "3"), (140, "4"), (150, "5")])
        );
        assert_eq!(
            strings(ts.range("test", RangeQuery::between(125, 145)).unwrap()),
            expected(&[(130, "3"), (140, "4")])
        );

        ts.remove(["test"], Some(120), Some(120)).unwrap();
        assert_eq!(ts.missing("test", 100, Some(150), None).unwrap(), vec![120]);

        ts.remove(["test"], None, None).unwrap();
        assert!(ts.range("test", RangeQuery::new()).unwrap().is_empty());
        assert!(ts.keys().unwrap().is_empty());
    });
}

#[test]
fn decimation_with_explicit_frequency() {
    for_each_backend(|stores| {
        let store = stores.writable();
        let ts = store.timeseries();
        ts.extend("dense", (0..100).map(|t| (t, t))).unwrap();

        let every_ten = ts.range("dense", RangeQuery::new().freq(10)).unwrap();
        assert_eq!(every_ten.len(), 10);
        assert_eq!(every_ten[3], (30, Value::from(30)));
        assert_eq!(ts.range("dense", RangeQuery::new()).unwrap().len(), 100);
        assert!(ts.is_complete("dense", 0, Some(99), Some(1)).unwrap());
    });
}

#[test]
fn frozen_store_and_unknown_namespace() {
    for_each_backend(|stores| {
        assert!(matches!(stores.read_only(), Err(CoreError::StoreNotAvailable { .. })));

        stores.writable().timeseries().extend("k", [(1, 1.5)]).unwrap();
        let reader = stores.read_only().unwrap();
        assert_eq!(reader.timeseries().first("k").unwrap(), Some((1, Value::from(1.5))));
        assert!(matches!(
            reader.timeseries().extend("k", [(2, 2.5)]),
            Err(CoreError::FrozenStore)
        ));
        assert!(matches!(
            reader.timeseries().remove(["k"], None, None),
            Err(CoreError::FrozenStore)
        ));
    });
}
