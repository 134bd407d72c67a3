/*
 *  bin/lymatrix-send.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Push a scene configuration to a running lymatrix server
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueHint};
use env_logger::Env;
use futures_util::{SinkExt, StreamExt};
use log::info;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use lymatrix::embed::{embed_gif, embed_image, split_entry};

#[derive(Debug, Parser)]
#[command(name = "lymatrix-send", about = "Send a scene configuration to lymatrix", version)]
struct Args {
    /// JSON scene configuration
    #[arg(value_hint = ValueHint::FilePath)]
    scenes: PathBuf,

    /// Server address
    #[arg(short, long, default_value = "ws://localhost:8765")]
    url: String,

    /// Embed an image as data.images[NAME], repeatable: --image logo=logo.png
    /// (non-PNG files are converted)
    #[arg(short, long = "image", value_name = "NAME=PATH")]
    images: Vec<String>,

    /// Embed every GIF frame as data.images[NAME_0..NAME_N], repeatable
    #[arg(short, long = "gif", value_name = "NAME=PATH")]
    gifs: Vec<String>,

    /// Also append one image scene per GIF frame, held for the frame delay
    #[arg(short, long)]
    animate: bool,

    /// Seconds to wait for the acknowledgement
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

fn embed_files(payload: &mut Value, images: &[String], gifs: &[String], animate: bool) -> anyhow::Result<()> {
    for entry in images {
        let (name, path) = split_entry(entry).context("--image")?;
        let bytes = std::fs::read(path).with_context(|| format!("reading image {}", path))?;
        embed_image(payload, name, &bytes)?;
        info!("Embedded {} as '{}'", path, name);
    }
    for entry in gifs {
        let (name, path) = split_entry(entry).context("--gif")?;
        let bytes = std::fs::read(path).with_context(|| format!("reading GIF {}", path))?;
        let frames = embed_gif(payload, name, &bytes, animate)?;
        info!("Embedded {} frame(s) of {} as '{}_0'..'{}_{}'", frames, path, name, name, frames - 1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.scenes)
        .with_context(|| format!("reading {}", args.scenes.display()))?;
    let mut payload: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", args.scenes.display()))?;
    embed_files(&mut payload, &args.images, &args.gifs, args.animate)?;

    let (mut ws, _) = connect_async(args.url.as_str())
        .await
        .with_context(|| format!("connecting to {}", args.url))?;
    info!("Connected to {}", args.url);

    ws.send(Message::text(payload.to_string())).await?;

    let ack = tokio::time::timeout(Duration::from_secs(args.timeout), async {
        while let Some(msg) = ws.next().await {
            if let Message::Text(text) = msg? {
                return Ok::<_, anyhow::Error>(text.as_str().to_owned());
            }
        }
        bail!("connection closed before acknowledgement")
    })
    .await
    .context("waiting for acknowledgement")??;

    let _ = ws.close(None).await;
    println!("{}", ack);

    let reply: Value = serde_json::from_str(&ack).context("malformed acknowledgement")?;
    if reply["status"] != "ok" {
        bail!("server rejected configuration: {}", reply["message"]);
    }
    Ok(())
}
