use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use batchload_rs::{BatchFunction, BatchResult, LoadError, Loader, LoaderConfig};
use futures::future;
use parking_lot::Mutex;

#[derive(Debug, PartialEq, Eq, Clone, Default)]
struct DummyData(String);

struct DummyContext {
    map: HashMap<i64, String>,
}

struct DummyDataLoader;

#[async_trait]
impl BatchFunction<i64, DummyData> for DummyDataLoader {
    type Context = DummyContext;
    type Error = String;

    async fn load(keys: &[i64], context: &DummyContext) -> BatchResult<DummyData, String> {
        keys.iter()
            .map(|k| {
                context.map.get(k).cloned().map(DummyData).ok_or_else(|| format!("no value for {}", k))
            })
            .collect()
    }
}

/// Records every batch handed to the fetch function.
#[derive(Clone, Default)]
struct FetchLog(Arc<Mutex<Vec<Vec<i64>>>>);

impl FetchLog {
    fn record(&self, keys: &[i64]) {
        self.0.lock().push(keys.to_vec());
    }

    fn batches(&self) -> Vec<Vec<i64>> {
        self.0.lock().clone()
    }
}

/// Even key -> key * 10, odd key -> per-key error.
fn even_loader(config: LoaderConfig, log: FetchLog) -> Loader<i64, i64, String> {
    Loader::from_fn(config, move |keys: Vec<i64>| {
        let log = log.clone();
        async move {
            log.record(&keys);
            keys.iter()
                .map(|k| if k % 2 == 0 { Ok(k * 10) } else { Err("some error".to_owned()) })
                .collect::<BatchResult<i64, String>>()
        }
    })
}

fn fast() -> LoaderConfig {
    LoaderConfig::new(Duration::from_millis(1))
}

#[tokio::test]
async fn basic_load() {
    let mut context = DummyContext { map: HashMap::new() };
    context.map.insert(42, "Foo".to_owned());

    let loader = Loader::new(DummyDataLoader {}, context);
    assert_eq!(loader.load(42).await, Ok(DummyData("Foo".to_owned())));
}

#[tokio::test]
async fn repeated_load() {
    let mut context = DummyContext { map: HashMap::new() };
    context.map.insert(42, "Foo".to_owned());

    let loader = Loader::new(DummyDataLoader {}, context);
    assert_eq!(loader.load(42).await, Ok(DummyData("Foo".to_owned())));
    assert_eq!(loader.load(42).await, Ok(DummyData("Foo".to_owned())));
}

#[tokio::test]
async fn basic_load_all() {
    let mut context = DummyContext { map: HashMap::new() };
    context.map.insert(42, "one fish".to_owned());
    context.map.insert(12, "two fish".to_owned());
    context.map.insert(5, "red fish".to_owned());
    context.map.insert(8, "blue fish".to_owned());

    let loader = Loader::new(DummyDataLoader {}, context);
    assert_eq!(
        loader.load_all(vec![5, 12, 8]).await,
        vec![
            Ok(DummyData("red fish".to_owned())),
            Ok(DummyData("two fish".to_owned())),
            Ok(DummyData("blue fish".to_owned()))
        ]
    );
}

#[tokio::test]
async fn load_async() {
    let mut context = DummyContext { map: HashMap::new() };
    context.map.insert(42, "one fish".to_owned());
    context.map.insert(12, "two fish".to_owned());
    context.map.insert(5, "red fish".to_owned());
    context.map.insert(8, "blue fish".to_owned());

    let loader = Loader::new(DummyDataLoader {}, context);

    let tuple = future::join4(
        loader.load(5),
        loader.load_all(vec![5, 42]),
        loader.load(99),
        loader.load(12),
    );

    assert_eq!(
        tuple.await,
        (
            Ok(DummyData("red fish".to_owned())),
            vec![Ok(DummyData("red fish".to_owned())), Ok(DummyData("one fish".to_owned()))],
            Err(LoadError::Fetch("no value for 99".to_owned())),
            Ok(DummyData("two fish".to_owned()))
        )
    );
}

#[tokio::test]
async fn load_values_and_errors() {
    let log = FetchLog::default();
    let loader = even_loader(fast(), log.clone());
    assert!(loader.prime(-1, 1000));

    assert_eq!(loader.load(0).await, Ok(0));
    assert_eq!(loader.load(1).await, Err(LoadError::Fetch("some error".to_owned())));
    assert_eq!(loader.load(-1).await, Ok(1000));
    assert_eq!(log.batches(), vec![vec![0], vec![1]]);
}

#[tokio::test]
async fn load_all_preserves_order_and_skips_cached() {
    let log = FetchLog::default();
    let loader = even_loader(fast(), log.clone());
    loader.prime(-1, 1000);

    let results = loader.load_all(vec![-1, 0, 1, 2, 3]).await;
    let values = results.iter().map(|r| r.clone().unwrap_or_default()).collect::<Vec<_>>();
    let failed = results.iter().map(Result::is_err).collect::<Vec<_>>();

    assert_eq!(values, vec![1000, 0, 0, 20, 0]);
    assert_eq!(failed, vec![false, false, true, false, true]);
    assert_eq!(log.batches(), vec![vec![0, 1, 2, 3]]);
}

#[tokio::test]
async fn primed_key_bypasses_fetch() {
    let log = FetchLog::default();
    let loader = even_loader(fast(), log.clone());

    assert!(loader.prime(5, 500));
    assert_eq!(loader.load(5).await, Ok(500));
    assert!(log.batches().is_empty());
}

#[tokio::test]
async fn prime_never_overwrites() {
    let loader = even_loader(fast(), FetchLog::default());

    assert!(loader.prime(10, 1000));
    assert!(!loader.prime(10, 2000));
    assert_eq!(loader.load(10).await, Ok(1000));
}

#[tokio::test]
async fn clear_then_prime() {
    let loader = even_loader(fast(), FetchLog::default());

    assert!(loader.prime(10, 100));
    loader.clear(10);
    assert!(loader.prime(10, 200));
    assert_eq!(loader.load(10).await, Ok(200));

    // Clearing an absent key is a no-op.
    loader.clear(77);
}

#[tokio::test]
async fn prime_many_and_clear_many() {
    let log = FetchLog::default();
    let loader = even_loader(fast(), log.clone());

    assert_eq!(loader.prime_many(vec![(1, 11), (3, 33)]), 2);
    assert_eq!(loader.prime_many(vec![(1, 99), (5, 55)]), 1);
    assert_eq!(loader.load_all(vec![1, 3, 5]).await, vec![Ok(11), Ok(33), Ok(55)]);
    assert!(log.batches().is_empty());

    loader.clear_many(&[1, 3]);
    assert!(loader.prime(1, 12));
    assert!(!loader.prime(5, 56));

    loader.clear_all();
    assert!(loader.prime(5, 56));
}

#[tokio::test]
async fn loaded_values_are_cached() {
    let log = FetchLog::default();
    let loader = even_loader(fast(), log.clone());

    assert_eq!(loader.load(2).await, Ok(20));
    assert_eq!(loader.load(2).await, Ok(20));
    assert!(!loader.prime(2, 0));
    assert_eq!(log.batches(), vec![vec![2]]);
}

#[tokio::test]
async fn concurrent_loads_share_one_key() {
    let log = FetchLog::default();
    let loader = even_loader(fast(), log.clone());

    let (a, b) = futures::join!(loader.load(4), loader.load(4));

    assert_eq!(a, Ok(40));
    assert_eq!(b, Ok(40));
    assert_eq!(log.batches(), vec![vec![4]]);
}

#[tokio::test]
async fn duplicate_keys_in_load_all_share_a_slot() {
    let log = FetchLog::default();
    let loader = even_loader(fast(), log.clone());

    assert_eq!(loader.load_all(vec![6, 8, 6]).await, vec![Ok(60), Ok(80), Ok(60)]);
    assert_eq!(log.batches(), vec![vec![6, 8]]);
}

#[tokio::test]
async fn full_batch_dispatches_without_waiting_for_window() {
    let log = FetchLog::default();
    let config = LoaderConfig::new(Duration::from_secs(60)).with_max_batch(3);
    let loader = even_loader(config, log.clone());

    let results = tokio::time::timeout(Duration::from_secs(5), loader.load_all(vec![2, 4, 6]))
        .await
        .expect("size limit should dispatch before the window elapses");

    assert_eq!(results, vec![Ok(20), Ok(40), Ok(60)]);
    assert_eq!(log.batches(), vec![vec![2, 4, 6]]);
}

#[tokio::test]
async fn keys_beyond_the_limit_start_a_new_batch() {
    let log = FetchLog::default();
    let config = LoaderConfig::new(Duration::from_millis(5)).with_max_batch(2);
    let loader = even_loader(config, log.clone());

    let results = loader.load_all(vec![2, 4, 6, 4, 8]).await;

    assert_eq!(results, vec![Ok(20), Ok(40), Ok(60), Ok(40), Ok(80)]);
    // 4 is still in flight when the second batch opens, so it is registered again.
    let mut batches = log.batches();
    batches.sort();
    assert_eq!(batches, vec![vec![2, 4], vec![6, 4], vec![8]]);
}

#[tokio::test]
async fn max_batch_of_one_dispatches_every_key() {
    let log = FetchLog::default();
    let config = LoaderConfig::new(Duration::from_secs(60)).with_max_batch(1);
    let loader = even_loader(config, log.clone());

    let results = tokio::time::timeout(Duration::from_secs(5), loader.load_all(vec![2, 4]))
        .await
        .expect("every key should dispatch immediately");

    assert_eq!(results, vec![Ok(20), Ok(40)]);
    let mut batches = log.batches();
    batches.sort();
    assert_eq!(batches, vec![vec![2], vec![4]]);
}

#[tokio::test]
async fn zero_window_dispatches() {
    let log = FetchLog::default();
    let loader = even_loader(LoaderConfig::new(Duration::ZERO), log.clone());

    assert_eq!(loader.load_all(vec![2, 4]).await, vec![Ok(20), Ok(40)]);
    assert_eq!(log.batches(), vec![vec![2, 4]]);
}

#[tokio::test]
async fn shared_error_reaches_every_key() {
    let loader = Loader::<i64, i64, String>::from_fn(fast(), |_keys: Vec<i64>| async {
        BatchResult::<i64, String>::shared_error("backend down".to_owned())
    });

    let expected = Err(LoadError::Fetch("backend down".to_owned()));
    assert_eq!(loader.load_all(vec![1, 2, 3]).await, vec![expected.clone(), expected.clone(), expected]);
}

#[tokio::test]
async fn per_key_errors_are_positional() {
    let loader = Loader::<i64, i64, String>::from_fn(fast(), |keys: Vec<i64>| async move {
        let values: Vec<i64> = keys.iter().map(|k| k * 2).collect();
        let errors: Vec<Option<String>> =
            keys.iter().map(|k| (*k == 2).then(|| "two".to_owned())).collect();
        BatchResult::per_key(values, errors)
    });

    assert_eq!(
        loader.load_all(vec![1, 2, 3]).await,
        vec![Ok(2), Err(LoadError::Fetch("two".to_owned())), Ok(6)]
    );
}

#[tokio::test]
async fn failed_keys_are_fetched_again() {
    let log = FetchLog::default();
    let loader = even_loader(fast(), log.clone());

    assert!(loader.load(3).await.is_err());
    assert!(loader.load(3).await.is_err());
    assert_eq!(log.batches(), vec![vec![3], vec![3]]);
    assert!(loader.prime(3, 30));
}

#[tokio::test]
async fn short_results_resolve_to_default() {
    let loader = Loader::<i64, i64, String>::from_fn(fast(), |keys: Vec<i64>| async move {
        BatchResult::<i64, String>::ok(keys.iter().take(1).map(|k| k + 1).collect())
    });

    assert_eq!(loader.load_all(vec![7, 8]).await, vec![Ok(8), Ok(0)]);
}

#[tokio::test]
async fn panicking_fetch_cancels_waiters() {
    let loader = Loader::<i64, i64, String>::from_fn(fast(), |keys: Vec<i64>| async move {
        if keys.contains(&1) {
            panic!("fetch exploded");
        }
        BatchResult::<i64, String>::ok(keys)
    });

    assert_eq!(loader.load(1).await, Err(LoadError::Canceled));
    assert_eq!(loader.load(2).await, Ok(2));
}

#[tokio::test]
async fn thunks_register_before_waiting() {
    let users_log = FetchLog::default();
    let posts_log = FetchLog::default();
    let users = even_loader(fast(), users_log.clone());
    let posts = even_loader(fast(), posts_log.clone());

    let user = users.load_thunk(2);
    let post_ids = posts.load_all_thunk(vec![4, 6]);
    let another_user = users.load_thunk(8);

    let (user, post_ids, another_user) =
        futures::join!(user.resolve(), post_ids.resolve(), another_user.resolve());

    assert_eq!(user, Ok(20));
    assert_eq!(post_ids, vec![Ok(40), Ok(60)]);
    assert_eq!(another_user, Ok(80));
    assert_eq!(users_log.batches(), vec![vec![2, 8]]);
    assert_eq!(posts_log.batches(), vec![vec![4, 6]]);
}

#[tokio::test]
async fn thunks_can_be_awaited_directly() {
    let loader = even_loader(fast(), FetchLog::default());

    let thunk = loader.load_thunk(2);
    let all = loader.load_all_thunk(vec![2, 3]);

    assert_eq!(thunk.await, Ok(20));
    assert_eq!(all.await, vec![Ok(20), Err(LoadError::Fetch("some error".to_owned()))]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_coalesce() {
    let log = FetchLog::default();
    let loader = even_loader(LoaderConfig::new(Duration::from_millis(50)), log.clone());

    let handles = (0..32)
        .map(|i| {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load((i % 8) * 2).await })
        })
        .collect::<Vec<_>>();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), Ok(((i as i64) % 8) * 20));
    }

    let mut fetched = log.batches().concat();
    fetched.sort();
    fetched.dedup();
    assert_eq!(fetched, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    assert!(log.batches().len() < 32);
}

#[cfg(feature = "stats")]
#[tokio::test]
async fn stats_count_batches_and_hits() {
    let config = LoaderConfig::new(Duration::from_millis(5)).with_max_batch(2);
    let loader = even_loader(config, FetchLog::default());
    loader.prime(0, 0);

    loader.load_all(vec![0, 2, 4, 6]).await;

    let stats = loader.stats();
    assert_eq!(stats.load_requests, 4);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.size_flushes, 1);
    assert_eq!(stats.window_flushes, 1);
    assert_eq!(stats.keys_fetched, 3);
    assert_eq!(stats.max_batch_size, 2);
}
