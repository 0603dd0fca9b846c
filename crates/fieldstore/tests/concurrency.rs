//! Locking behaviour under contention and lock placement of callbacks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use fieldstore::prelude::*;
use once_cell::sync::OnceCell;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn range_schema() -> Arc<Schema> {
    let hi = Field::builder()
        .default(100)
        .typed(TypeSpec::Int)
        .conflicts("lo", |_, new_hi, _, lo| new_hi.as_int() <= lo.as_int())
        .build()
        .unwrap();
    Schema::builder("Range")
        .field(
            "lo",
            &Field::builder()
                .default(0)
                .typed(TypeSpec::Int)
                .build()
                .unwrap(),
        )
        .field("hi", &hi)
        .field("label", &Field::with_default("range"))
        .build()
        .unwrap()
}

#[test]
fn test_conflicting_fields_share_a_lock() {
    let storage = Storage::new(&range_schema()).unwrap();
    let lo = storage.field_lock("lo").unwrap();
    let hi = storage.field_lock("hi").unwrap();
    let label = storage.field_lock("label").unwrap();

    assert!(Arc::ptr_eq(lo, hi));
    assert!(!Arc::ptr_eq(lo, label));
}

#[test]
fn test_lock_groups_are_transitive() {
    let b = Field::builder()
        .default(2)
        .conflicts("a", |_, _, _, _| false)
        .build()
        .unwrap();
    let c = Field::builder()
        .default(3)
        .conflicts("b", |_, _, _, _| false)
        .build()
        .unwrap();
    let schema = Schema::builder("Chain")
        .field("a", &Field::with_default(1))
        .field("b", &b)
        .field("c", &c)
        .field("d", &Field::with_default(4))
        .build()
        .unwrap();
    let storage = Storage::new(&schema).unwrap();

    let a = storage.field_lock("a").unwrap();
    assert!(Arc::ptr_eq(a, storage.field_lock("c").unwrap()));
    assert!(!Arc::ptr_eq(a, storage.field_lock("d").unwrap()));
}

#[test]
fn test_concurrent_writes_keep_range_ordered() {
    init_tracing();
    let storage = Storage::new(&range_schema()).unwrap();
    let committed = AtomicUsize::new(0);
    let rejected = AtomicUsize::new(0);

    thread::scope(|scope| {
        for worker in 0..8i64 {
            let storage = &storage;
            let committed = &committed;
            let rejected = &rejected;
            scope.spawn(move || {
                for step in 0..200i64 {
                    let value = (worker * 37 + step * 13) % 150;
                    let name = if (worker + step) % 2 == 0 { "lo" } else { "hi" };
                    match storage.set(name, value) {
                        Ok(()) => committed.fetch_add(1, Ordering::Relaxed),
                        Err(FieldError::Conflict { .. }) => rejected.fetch_add(1, Ordering::Relaxed),
                        Err(other) => panic!("unexpected error: {other:?}"),
                    };
                }
            });
        }
    });

    let lo = storage.get("lo").unwrap().as_int().unwrap();
    let hi = storage.get("hi").unwrap().as_int().unwrap();
    assert!(lo < hi, "lo={lo} hi={hi}");
    assert_eq!(
        committed.load(Ordering::Relaxed) + rejected.load(Ordering::Relaxed),
        8 * 200
    );
}

#[test]
fn test_concurrent_writes_to_independent_fields() {
    let schema = Schema::builder("Counters")
        .field("left", &Field::with_default(0))
        .field("right", &Field::with_default(0))
        .build()
        .unwrap();
    let storage = Storage::new(&schema).unwrap();

    thread::scope(|scope| {
        for name in ["left", "right"] {
            let storage = &storage;
            scope.spawn(move || {
                for value in 1..=500i64 {
                    storage.set(name, value).unwrap();
                }
            });
        }
    });

    assert_eq!(storage.get("left").unwrap(), Value::Int(500));
    assert_eq!(storage.get("right").unwrap(), Value::Int(500));
}

#[test]
fn test_pipeline_runs_outside_lock_and_change_action_inside() {
    init_tracing();
    let cell: Arc<OnceCell<Arc<Storage>>> = Arc::new(OnceCell::new());
    let locked_during_pipeline = Arc::new(AtomicBool::new(false));
    let locked_during_change = Arc::new(AtomicBool::new(false));

    let is_locked = {
        let cell = Arc::clone(&cell);
        move || {
            cell.get()
                .and_then(|storage| storage.field_lock("n").map(|lock| lock.is_locked()))
                .unwrap_or(false)
        }
    };

    let field = Field::builder()
        .default(1)
        .typed(TypeSpec::Int)
        .conversion({
            let is_locked = is_locked.clone();
            let seen = Arc::clone(&locked_during_pipeline);
            move |v| {
                if is_locked() {
                    seen.store(true, Ordering::SeqCst);
                }
                v
            }
        })
        .validation({
            let is_locked = is_locked.clone();
            let seen = Arc::clone(&locked_during_pipeline);
            move |_| {
                if is_locked() {
                    seen.store(true, Ordering::SeqCst);
                }
                true
            }
        })
        .on_change({
            let seen = Arc::clone(&locked_during_change);
            move |_, _, instance| {
                let held = instance
                    .field_lock("n")
                    .map(|lock| lock.is_locked())
                    .unwrap_or(false);
                seen.store(held, Ordering::SeqCst);
            }
        })
        .build()
        .unwrap();
    let schema = Schema::builder("Probe").field("n", &field).build().unwrap();
    let storage = Arc::new(Storage::new(&schema).unwrap());
    cell.set(Arc::clone(&storage)).unwrap();

    storage.set("n", 2).unwrap();

    assert!(!locked_during_pipeline.load(Ordering::SeqCst));
    assert!(locked_during_change.load(Ordering::SeqCst));
    assert!(!storage.field_lock("n").unwrap().is_locked());
}

#[test]
fn test_read_lock_policy() {
    let schema = Schema::builder("Reads")
        .field("locked", &Field::with_default(1))
        .field(
            "unlocked",
            &Field::builder().default(2).read_lock(false).build().unwrap(),
        )
        .build()
        .unwrap();
    let storage = Storage::new(&schema).unwrap();

    let locked = Arc::clone(storage.field_lock("locked").unwrap());
    let unlocked = Arc::clone(storage.field_lock("unlocked").unwrap());
    let (locked_before, unlocked_before) = (locked.acquisitions(), unlocked.acquisitions());

    for _ in 0..3 {
        storage.get("locked").unwrap();
        storage.get("unlocked").unwrap();
    }
    assert_eq!(locked.acquisitions(), locked_before + 3);
    assert_eq!(unlocked.acquisitions(), unlocked_before);

    storage.set("unlocked", 5).unwrap();
    assert_eq!(unlocked.acquisitions(), unlocked_before + 1);
    assert!(!schema.field("unlocked").unwrap().is_read_locked());
}

#[test]
fn test_unlocked_read_proceeds_while_lock_is_held() {
    let schema = Schema::builder("Reads")
        .field(
            "n",
            &Field::builder().default(7).read_lock(false).build().unwrap(),
        )
        .build()
        .unwrap();
    let storage = Storage::new(&schema).unwrap();

    let lock = Arc::clone(storage.field_lock("n").unwrap());
    let _guard = lock.acquire();
    assert_eq!(storage.get("n").unwrap(), Value::Int(7));
}
