use eventide_server::EventideServer;

#[derive(clap::Parser)]
struct Args {
    #[arg(long, default_value = "config/eventide.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();

    use eventide_common::config::AppConfig;
    let app_config = AppConfig::from_file(&args.config).unwrap_or_default();

    println!("--------------------------------------------------");
    println!("   {}", app_config.server.name);
    println!("   Listen Addr: {}", app_config.server.listen_addr);
    println!("   Storage:     {}", app_config.storage.url);
    println!("   Workers:     {}", app_config.pool.workers);
    println!("--------------------------------------------------");

    EventideServer::new().with_config(&args.config).run().await
}
