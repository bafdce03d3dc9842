extern crate tello_link;

use tokio::time::{sleep, Duration};

use tello_link::{DroneLink, LinkOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let link = DroneLink::new(LinkOptions::default());
    link.connect().await?;
    link.set_stream(true).await?;

    link.start_recording().await?;
    sleep(Duration::from_secs(10)).await;
    let clip = link.stop_recording().await?;
    println!("recorded {} bytes", clip.len());
    std::fs::write("clip.h264", &clip)?;

    link.set_stream(false).await?;
    link.disconnect().await;
    Ok(())
}
