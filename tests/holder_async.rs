#![cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lazy_singleton::{FailurePolicy, Holder, HolderState, SingletonError};

#[tokio::test]
async fn test_get_or_init_async() {
   let holder: Holder<i32> = Holder::new();
   let counter = Arc::new(AtomicUsize::new(0));

   let value = holder
      .get_or_init_async(|| {
         let counter = Arc::clone(&counter);
         async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            42
         }
      })
      .await;
   assert_eq!(value, &42);
   assert_eq!(holder.state(), HolderState::Present);

   // Second call should not create the future
   let again = holder
      .get_or_init_async(|| async {
         counter.fetch_add(1, Ordering::SeqCst);
         panic!("Should not be called");
      })
      .await;
   assert!(std::ptr::eq(value, again));
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_construct_once() {
   let holder: Arc<Holder<String>> = Arc::new(Holder::new());
   let constructions = Arc::new(AtomicUsize::new(0));

   let tasks: Vec<_> = (0..100)
      .map(|_| {
         let holder = Arc::clone(&holder);
         let constructions = Arc::clone(&constructions);
         tokio::spawn(async move {
            let value = holder
               .get_or_init_async(|| async move {
                  constructions.fetch_add(1, Ordering::SeqCst);
                  tokio::time::sleep(Duration::from_millis(20)).await;
                  String::from("shared")
               })
               .await;
            value as *const String as usize
         })
      })
      .collect();

   let mut addresses = Vec::with_capacity(tasks.len());
   for task in tasks {
      addresses.push(task.await.unwrap());
   }
   assert_eq!(constructions.load(Ordering::SeqCst), 1);
   let expected = holder.get().unwrap() as *const String as usize;
   assert!(addresses.iter().all(|&addr| addr == expected));
}

#[tokio::test]
async fn test_get_or_try_init_async_failure_then_retry() {
   let holder: Holder<String> = Holder::new();

   let result = holder
      .get_or_try_init_async(|| async {
         tokio::time::sleep(Duration::from_millis(5)).await;
         Err::<String, _>("async fail")
      })
      .await;
   assert_eq!(result, Err(SingletonError::ConstructionFailed("async fail")));
   assert_eq!(holder.state(), HolderState::Absent);

   let result = holder
      .get_or_try_init_async(|| async { Ok::<_, &str>(String::from("async ok")) })
      .await;
   assert_eq!(result.map(String::as_str), Ok("async ok"));
   assert_eq!(holder.state(), HolderState::Present);
}

#[tokio::test]
async fn test_get_or_try_init_async_poison() {
   let holder: Holder<u8> = Holder::with_policy(FailurePolicy::Poison);

   let result = holder.get_or_try_init_async(|| async { Err::<u8, _>(()) }).await;
   assert_eq!(result, Err(SingletonError::ConstructionFailed(())));

   let result = holder
      .get_or_try_init_async(|| async { Ok::<u8, ()>(1) })
      .await;
   assert_eq!(result, Err(SingletonError::Poisoned));
   assert_eq!(holder.state(), HolderState::Poisoned);
}

#[tokio::test]
async fn test_cancelled_construction_resets_holder() {
   let holder: Holder<u32> = Holder::new();

   let timed_out = tokio::time::timeout(
      Duration::from_millis(10),
      holder.get_or_init_async(|| async {
         tokio::time::sleep(Duration::from_secs(5)).await;
         1
      }),
   )
   .await;
   assert!(timed_out.is_err());
   assert_eq!(holder.state(), HolderState::Absent);

   assert_eq!(holder.get_or_init_async(|| async { 2 }).await, &2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_and_async_callers_share_instance() {
   let holder: Arc<Holder<Vec<u8>>> = Arc::new(Holder::new());

   let async_value = holder
      .get_or_init_async(|| async { vec![1, 2, 3] })
      .await as *const Vec<u8> as usize;

   let sync_value = {
      let holder = Arc::clone(&holder);
      tokio::task::spawn_blocking(move || {
         holder.get_or_init(|| unreachable!()) as *const Vec<u8> as usize
      })
      .await
      .unwrap()
   };
   assert_eq!(async_value, sync_value);
}

#[tokio::test]
async fn test_contending_tasks_on_current_thread_runtime() {
   let holder: Arc<Holder<u32>> = Arc::new(Holder::new());

   let constructor = {
      let holder = Arc::clone(&holder);
      tokio::spawn(async move {
         *holder
            .get_or_init_async(|| async {
               tokio::time::sleep(Duration::from_millis(200)).await;
               1
            })
            .await
      })
   };
   tokio::time::sleep(Duration::from_millis(10)).await;
   assert_eq!(holder.state(), HolderState::Constructing);

   // Waits on the single worker thread without blocking it.
   let waiter = holder.get_or_init_async(|| async { 2 }).await;
   assert_eq!(waiter, &1);
   assert_eq!(constructor.await.unwrap(), 1);
}

#[tokio::test]
async fn test_sync_reentry_from_async_constructor_is_reported() {
   let holder: Holder<u32> = Holder::new();

   let value = holder
      .get_or_try_init_async(|| async {
         match holder.try_get_or_init(|| 7) {
            Err(SingletonError::Reentrant) => Ok::<u32, ()>(1),
            other => panic!("expected reentrancy error, got {other:?}"),
         }
      })
      .await;
   assert_eq!(value, Ok(&1));
}

#[tokio::test]
async fn test_async_reentry_from_async_constructor_is_reported() {
   let holder: Holder<u32> = Holder::new();

   let value = holder
      .get_or_try_init_async(|| async {
         match holder.get_or_try_init_async(|| async { Ok::<u32, ()>(7) }).await {
            Err(SingletonError::Reentrant) => Ok::<u32, ()>(1),
            other => panic!("expected reentrancy error, got {other:?}"),
         }
      })
      .await;
   assert_eq!(value, Ok(&1));
}

#[tokio::test]
async fn test_blocking_reentry_from_async_constructor_panics() {
   let holder: Arc<Holder<u32>> = Arc::new(Holder::new());

   let task = {
      let holder = Arc::clone(&holder);
      tokio::spawn(async move {
         let inner = Arc::clone(&holder);
         *holder
            .get_or_init_async(|| async move { *inner.get_or_init(|| 7) + 1 })
            .await
      })
   };
   let err = tokio::time::timeout(Duration::from_secs(3), task)
      .await
      .expect("reentrant construction must not hang")
      .unwrap_err();
   assert!(err.is_panic());

   // The guard unwound with the task, so the holder is usable again.
   assert_eq!(holder.state(), HolderState::Absent);
   assert_eq!(holder.get_or_init_async(|| async { 3 }).await, &3);
}
