//! The smallest possible lapis program: one singleton actor type, a few
//! keys, typed messages.
//!
//!     cargo run --example simple_actor

use lapis::prelude::*;

struct Greeter {
    key: u64,
    greeted: u64,
}

impl Actor for Greeter {
    type Key = u64;

    fn activate(key: &u64) -> Self {
        Self {
            key: *key,
            greeted: 0,
        }
    }
}

impl Greeter {
    fn greet(&mut self, who: String) -> String {
        self.greeted += 1;
        format!("[greeter {} on shard {}] hello, {} (greeting #{})",
                self.key, current_shard(), who, self.greeted)
    }

    fn greeted(&self) -> u64 {
        self.greeted
    }
}

messages! {
    impl Greeter as pub mod greeter {
        fn greet(&mut self, who: String) -> String;
        fn greeted(&self) -> u64;
    }
}

fn main() -> lapis::Result<()> {
    tracing_subscriber::fmt::init();

    Runtime::new(RuntimeOptions::default()).block_on(|| async {
        use greeter::Tell as _;

        for key in 0..4u64 {
            let greeter = lapis::get::<Greeter>(key);
            println!("{}", greeter.greet("world".to_owned()).await?);
            println!("{}", greeter.greet("again".to_owned()).await?);
        }

        let total = {
            let mut sum = 0;
            for key in 0..4u64 {
                sum += lapis::get::<Greeter>(key).greeted().await?;
            }
            sum
        };
        println!("{total} greetings delivered");
        Ok(())
    })
}
