//! Headless PIXNET server example with animated content.
//!
//! Continuously republishes an animated Page, demonstrating how to drive
//! the server without an actual screen capture source.
//!
//! Usage:
//!   cargo run --example headless_server

use std::error::Error;
use std::time::Duration;

use pixnet::page::{CategoryMap, Page, PixelBuffer, PixelFormat};
use pixnet::wire::messages::Capabilities;
use pixnet::{PixnetServer, ServerConfig};
use tokio::time;

const WIDTH: u16 = 640;
const HEIGHT: u16 = 480;

fn animated_page(frame: u32) -> Page {
    let mut pixels = vec![0u8; WIDTH as usize * HEIGHT as usize * 4];
    for y in 0..HEIGHT as usize {
        for x in 0..WIDTH as usize {
            let offset = (y * WIDTH as usize + x) * 4;
            pixels[offset] = ((x as u32 + frame) % 256) as u8;
            pixels[offset + 1] = ((y as u32 + frame) % 256) as u8;
            pixels[offset + 2] = ((frame / 2) % 256) as u8;
            pixels[offset + 3] = 255;
        }
    }

    Page {
        pixels: PixelBuffer::new(WIDTH, HEIGHT, PixelFormat::Rgba8, pixels).unwrap(),
        category_map: CategoryMap::new(WIDTH, HEIGHT, vec![0u16; WIDTH as usize * HEIGHT as usize]).unwrap(),
        categories: Default::default(),
        metadata: None,
        animation: None,
        audio: None,
        extended_metadata: None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    println!("Starting headless PIXNET server on port 7621...");

    let (server, mut events) = PixnetServer::new(ServerConfig::default(), Capabilities::default());

    let server_clone = server.clone();
    tokio::spawn(async move {
        if let Err(e) = server_clone.listen(7621).await {
            eprintln!("server error: {e}");
        }
    });

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{event:?}");
        }
    });

    println!("Server started, generating animated content...");
    println!("Press Ctrl+C to stop");

    let mut frame = 0u32;
    loop {
        server.publish_page(animated_page(frame)).await;
        frame = frame.wrapping_add(1);

        // ~30 FPS
        time::sleep(Duration::from_millis(33)).await;

        if frame % 300 == 0 {
            println!("frame: {frame}, sessions: {}", server.session_count().await);
        }
    }
}
