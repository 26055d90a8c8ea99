//! Key-prefix isolation between providers sharing one store.

use std::collections::HashSet;
use std::sync::Arc;

use redcache::{
    Context, Expiry, KeyCommands, Options, Provider, SetCommands, Store, StringCommands, Value,
};

fn tenants() -> (Provider, Provider, Provider, Context) {
    let store = Arc::new(Store::open_memory().unwrap());
    let a = Provider::with_options(store.clone(), &Options::new().prefix("tenant-a:"));
    let b = Provider::with_options(store.clone(), &Options::new().prefix(" tenant-b: "));
    let root = Provider::new(store);
    (a, b, root, Context::background())
}

#[test]
fn test_prefix_is_applied_and_stripped() {
    let (a, b, root, ctx) = tenants();
    a.set(&ctx, "k", "from a".into(), Expiry::Never).unwrap();
    b.set(&ctx, "k", "from b".into(), Expiry::Never).unwrap();

    assert_eq!(a.get(&ctx, "k").unwrap(), b"from a".to_vec());
    assert_eq!(b.get(&ctx, "k").unwrap(), b"from b".to_vec());
    assert_eq!(b.prefix(), "tenant-b:");

    let mut all = root.keys(&ctx, "*").unwrap();
    all.sort();
    assert_eq!(all, vec!["tenant-a:k", "tenant-b:k"]);
}

#[test]
fn test_keys_and_scan_stay_inside_prefix() {
    let (a, b, _, ctx) = tenants();
    for i in 0..15 {
        a.set(&ctx, &format!("a{}", i), Value::Int(i), Expiry::Never).unwrap();
    }
    for i in 0..5 {
        b.set(&ctx, &format!("b{}", i), Value::Int(i), Expiry::Never).unwrap();
    }

    assert_eq!(a.keys(&ctx, "*").unwrap().len(), 15);
    assert_eq!(b.keys(&ctx, "*").unwrap().len(), 5);
    assert!(a.keys(&ctx, "b*").unwrap().is_empty());

    let mut seen = HashSet::new();
    let mut cursor = 0;
    loop {
        let page = a.scan(&ctx, cursor, "*", 4).unwrap();
        for key in page.keys {
            assert!(key.starts_with('a'), "leaked key {}", key);
            assert!(seen.insert(key));
        }
        if page.cursor == 0 {
            break;
        }
        cursor = page.cursor;
    }
    assert_eq!(seen.len(), 15);

    assert_eq!(a.db_size(&ctx).unwrap(), 15);
    assert_eq!(b.db_size(&ctx).unwrap(), 5);
}

#[test]
fn test_prefix_glob_characters_are_literal() {
    let store = Arc::new(Store::open_memory().unwrap());
    let star = Provider::with_options(store.clone(), &Options::new().prefix("t*:"));
    let plain = Provider::with_options(store, &Options::new().prefix("tx:"));
    let ctx = Context::background();

    star.set(&ctx, "k", "1".into(), Expiry::Never).unwrap();
    plain.set(&ctx, "k", "2".into(), Expiry::Never).unwrap();
    assert_eq!(star.keys(&ctx, "*").unwrap(), vec!["k"]);
    assert_eq!(star.scan(&ctx, 0, "*", 10).unwrap().keys, vec!["k"]);
}

#[test]
fn test_random_key_and_flush_are_scoped() {
    let (a, b, _, ctx) = tenants();
    assert!(a.random_key(&ctx).unwrap_err().is_nil());

    a.sadd(&ctx, "only", &["m".into()]).unwrap();
    b.set(&ctx, "x", "1".into(), Expiry::Never).unwrap();
    b.set(&ctx, "y", "2".into(), Expiry::Never).unwrap();
    for _ in 0..20 {
        assert_eq!(a.random_key(&ctx).unwrap(), "only");
    }

    b.flush_all(&ctx).unwrap();
    assert_eq!(b.db_size(&ctx).unwrap(), 0);
    assert_eq!(a.db_size(&ctx).unwrap(), 1);
}

#[test]
fn test_multi_key_commands_stay_inside_prefix() {
    let (a, b, _, ctx) = tenants();
    a.sadd(&ctx, "s1", &["x".into(), "y".into()]).unwrap();
    b.sadd(&ctx, "s1", &["y".into(), "z".into()]).unwrap();
    b.sadd(&ctx, "s2", &["y".into()]).unwrap();

    assert_eq!(a.sinter(&ctx, &["s1", "s2"]).unwrap(), Vec::<Vec<u8>>::new());
    assert_eq!(b.sinter(&ctx, &["s1", "s2"]).unwrap(), vec![b"y".to_vec()]);

    a.rename(&ctx, "s1", "renamed").unwrap();
    assert_eq!(b.exists(&ctx, &["s1", "renamed"]).unwrap(), 1);
    assert_eq!(a.exists(&ctx, &["renamed"]).unwrap(), 1);
}
