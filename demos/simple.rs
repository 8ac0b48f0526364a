use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use batchload_rs::{BatchFunction, BatchResult, LoadError, Loader, LoaderConfig};

// Empty functor that implements the BatchFunction trait. For this example, it
// trivially loads values from some HashMap.
struct MyBatchFn;

#[async_trait]
impl BatchFunction<i64, String> for MyBatchFn {
    type Context = HashMap<i64, String>;
    type Error = String;

    async fn load(keys: &[i64], context: &Self::Context) -> BatchResult<String, String> {
        println!("fetching {:?}", keys);
        keys.iter().map(|k| context.get(k).cloned().ok_or_else(|| format!("unknown film {}", k))).collect()
    }
}

#[tokio::main]
async fn main() {
    let mut context = HashMap::new();
    context.insert(2001, "a space odyssey".to_owned());
    context.insert(7, "samurai".to_owned());
    context.insert(12, "angry men".to_owned());

    let config = LoaderConfig::new(Duration::from_millis(5)).with_max_batch(10);
    let loader = Loader::with_config(MyBatchFn {}, context, config);

    assert_eq!(loader.load(7).await.as_deref(), Ok("samurai"));
    assert_eq!(loader.load(15).await, Err(LoadError::Fetch("unknown film 15".to_owned())));

    // Both keys are registered before either is awaited, so they share one fetch.
    let first = loader.load_thunk(12);
    let second = loader.load_thunk(2001);
    assert_eq!(first.await.as_deref(), Ok("angry men"));
    assert_eq!(second.await.as_deref(), Ok("a space odyssey"));

    assert_eq!(
        loader
            .load_all(vec![12, 2010, 7])
            .await
            .into_iter()
            .map(Result::ok)
            .collect::<Vec<_>>(),
        vec![Some("angry men".to_owned()), None, Some("samurai".to_owned())]
    );
}
