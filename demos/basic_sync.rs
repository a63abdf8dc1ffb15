use std::sync::atomic::{AtomicUsize, Ordering};

use lazy_singleton::Lazy;

static CONSTRUCTIONS: AtomicUsize = AtomicUsize::new(0);

pub struct Connection {
   dsn: String,
}

static CONNECTION: Lazy<Connection> = Lazy::new(|| {
   CONSTRUCTIONS.fetch_add(1, Ordering::Relaxed);
   println!("Opening connection...");
   std::thread::sleep(std::time::Duration::from_millis(50));
   Connection {
      dsn: "postgres://localhost/app".to_string(),
   }
});

fn main() {
   let threads: Vec<_> = (0..5)
      .map(|_| {
         std::thread::spawn(|| {
            let conn = CONNECTION.get_instance();
            println!("Thread sees {} at {:p}", conn.dsn, conn);
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }

   assert_eq!(CONSTRUCTIONS.load(Ordering::Relaxed), 1); // Constructor ran only once
   println!("Final connection: {}", CONNECTION.dsn);
}
