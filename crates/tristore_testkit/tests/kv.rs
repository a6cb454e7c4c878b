//! Key/value conformance across backends.

use std::collections::BTreeSet;
use tristore_core::{CoreError, JsonSerializer, Store, Value};
use tristore_testkit::{for_each_backend, TestStores};

fn keys(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn set_find_and_delete() {
    for_each_backend(|stores| {
        let store = stores.writable();
        let kv = store.kv();
        assert!(kv.keys().unwrap().is_empty());

        kv.set("test.key1", "Some str").unwrap();
        kv.set("test.key2", 12).unwrap();
        kv.set("key3.test.abcd", vec![Value::from(1), Value::from(2.5)]).unwrap();

        assert_eq!(kv.get("test.key1").unwrap(), Some(Value::from("Some str")));
        assert_eq!(kv.len().unwrap(), 3);
        assert_eq!(kv.find(None).unwrap().len(), 3);
        let found: Vec<String> = kv.find(Some("test.*")).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(found, vec!["test.key1", "test.key2"]);
        assert!(kv.find(Some("test.abc*")).unwrap().is_empty());

        kv.delete(["test.key1", "key3.test.abcd"]).unwrap();
        assert_eq!(kv.keys().unwrap(), keys(&["test.key2"]));
        assert!(matches!(kv.require("test.key1"), Err(CoreError::KeyNotFound { .. })));
    });
}

#[test]
fn frozen_reader_sees_writes_but_cannot_write() {
    for_each_backend(|stores| {
        let writer = stores.writable();
        writer.kv().set("shared", 1).unwrap();

        let reader = stores.read_only().unwrap();
        assert_eq!(reader.kv().get("shared").unwrap(), Some(Value::from(1)));
        assert!(matches!(reader.kv().set("shared", 2), Err(CoreError::FrozenStore)));
        assert!(matches!(reader.kv().delete(["shared"]), Err(CoreError::FrozenStore)));

        writer.kv().set("shared", 3).unwrap();
        assert_eq!(reader.kv().get("shared").unwrap(), Some(Value::from(3)));
    });
}

#[test]
fn namespaces_are_isolated() {
    for_each_backend(|stores| {
        let a = stores.open(TestStores::config().namespace("a").frozen(false)).unwrap();
        let b = stores.open(TestStores::config().namespace("a:b").frozen(false)).unwrap();
        a.kv().set("b:k", "from a").unwrap();
        b.kv().set("k", "from a:b").unwrap();

        assert_eq!(a.kv().keys().unwrap(), keys(&["b:k"]));
        assert_eq!(b.kv().keys().unwrap(), keys(&["k"]));
        assert_eq!(b.kv().require("k").unwrap(), Value::from("from a:b"));
    });
}

#[test]
fn data_models_are_independent() {
    for_each_backend(|stores| {
        let store = stores.writable();
        store.kv().set("same", 1).unwrap();
        store.timeseries().extend("same", [(1, 2)]).unwrap();
        store.events().apply("same", [("item", 3)], Some(1)).unwrap();

        store.kv().delete(["same"]).unwrap();
        assert!(store.kv().keys().unwrap().is_empty());
        assert_eq!(store.timeseries().keys().unwrap(), keys(&["same"]));
        assert_eq!(store.events().keys().unwrap(), keys(&["same"]));
    });
}

#[test]
fn json_serializer_is_interchangeable() {
    for_each_backend(|stores| {
        let store = stores
            .open(TestStores::config().frozen(false).serializer(JsonSerializer))
            .unwrap();
        let doc = Value::map(vec![
            (Value::from("name"), Value::from("pump")),
            (Value::from("ratio"), Value::from(0.25)),
        ]);
        store.kv().set("doc", doc.clone()).unwrap();
        assert_eq!(store.kv().require("doc").unwrap(), doc);
        store.events().apply("seq", [("n", 1)], Some(1)).unwrap();
        assert_eq!(store.events().current("seq").unwrap().unwrap()["n"], Value::from(1));
    });
}

#[test]
fn discard_removes_the_namespace() {
    for_each_backend(|stores| {
        let store = stores.writable();
        store.kv().set("k", 1).unwrap();
        store.timeseries().extend("t", [(1, 1)]).unwrap();
        store.events().apply("e", [("i", 1)], Some(1)).unwrap();
        store.discard().unwrap();

        assert!(
            matches!(stores.read_only(), Err(CoreError::StoreNotAvailable { .. })),
            "{}",
            stores.kind()
        );
        if let Some(path) = stores.path() {
            assert!(!path.exists(), "{}", stores.kind());
        }
        let fresh: Store = stores.writable();
        assert!(fresh.kv().is_empty().unwrap());
    });
}
