use std::sync::atomic::{AtomicUsize, Ordering};

use lazy_singleton::Holder;
use tokio::time::{sleep, Duration};

static CONSTRUCTIONS: AtomicUsize = AtomicUsize::new(0);
static CATALOG: Holder<Vec<String>> = Holder::new();

async fn catalog() -> &'static Vec<String> {
   CATALOG
      .get_or_init_async(|| async {
         CONSTRUCTIONS.fetch_add(1, Ordering::Relaxed);
         println!("Loading catalog...");
         sleep(Duration::from_millis(50)).await;
         vec!["alpha".to_string(), "beta".to_string()]
      })
      .await
}

#[tokio::main]
async fn main() {
   let tasks: Vec<_> = (0..5)
      .map(|_| {
         tokio::spawn(async {
            println!("Task sees {} entries", catalog().await.len());
         })
      })
      .collect();

   for t in tasks {
      t.await.unwrap();
   }

   assert_eq!(CONSTRUCTIONS.load(Ordering::Relaxed), 1); // Constructor ran only once
   println!("Final catalog: {:?}", catalog().await);
}
