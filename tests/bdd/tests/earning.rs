use cucumber::World;
use tvtime_bdd::EngineWorld;

#[tokio::main]
async fn main() {
    EngineWorld::cucumber()
        .fail_on_skipped()
        .max_concurrent_scenarios(1)
        .run_and_exit("tests/features")
        .await;
}
