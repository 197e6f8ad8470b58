//! Simple PIXNET server example.
//!
//! This example serves a single static Page with one clickable navigation
//! zone.
//!
//! Usage:
//!   cargo run --example simple_server
//!
//! Then connect with a PIXNET client to localhost:7621

use std::collections::HashMap;
use std::error::Error;

use pixnet::page::{Behavior, CategoryDef, CategoryMap, NavigateTarget, Page, PixelBuffer, PixelFormat};
use pixnet::wire::messages::Capabilities;
use pixnet::{PixnetServer, ServerConfig};

fn gradient_page() -> Page {
    const WIDTH: u16 = 800;
    const HEIGHT: u16 = 600;

    let mut pixels = vec![0u8; WIDTH as usize * HEIGHT as usize * 4];
    let mut category_ids = vec![0u16; WIDTH as usize * HEIGHT as usize];

    for y in 0..HEIGHT as usize {
        for x in 0..WIDTH as usize {
            let offset = (y * WIDTH as usize + x) * 4;
            pixels[offset] = (x * 255 / WIDTH as usize) as u8;
            pixels[offset + 1] = (y * 255 / HEIGHT as usize) as u8;
            pixels[offset + 2] = 128;
            pixels[offset + 3] = 255;

            // A 100x50 navigation zone in the top-left corner.
            if x < 100 && y < 50 {
                category_ids[y * WIDTH as usize + x] = 1;
            }
        }
    }

    let mut categories = HashMap::new();
    categories.insert(
        1,
        CategoryDef {
            id: 1,
            name: "home-link".to_string(),
            priority: 0,
            behavior: Behavior::Navigate {
                url: "pixnet://localhost:7621/home".to_string(),
                target: NavigateTarget::Same,
            },
            extended_properties: Vec::new(),
        },
    );

    Page {
        pixels: PixelBuffer::new(WIDTH, HEIGHT, PixelFormat::Rgba8, pixels).unwrap(),
        category_map: CategoryMap::new(WIDTH, HEIGHT, category_ids).unwrap(),
        categories,
        metadata: None,
        animation: None,
        audio: None,
        extended_metadata: None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    println!("Starting PIXNET server on port 7621...");
    println!("Connect a PIXNET client to localhost:7621");

    let (server, mut events) = PixnetServer::new(ServerConfig::default(), Capabilities::default());

    let server_clone = server.clone();
    tokio::spawn(async move {
        if let Err(e) = server_clone.listen(7621).await {
            eprintln!("server error: {e}");
        }
    });

    server.publish_page(gradient_page()).await;
    println!("Page published, server ready for connections");

    while let Some(event) = events.recv().await {
        println!("{event:?}");
    }

    Ok(())
}
