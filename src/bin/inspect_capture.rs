use anyhow::Result;
use ecg_stream::data_loading::{collect_capture_files, scan_capture_file};
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <capture file or directory>", args[0]);
        std::process::exit(1);
    }

    let files = collect_capture_files(Path::new(&args[1]))?;
    println!("\nFound {} capture files:", files.len());

    for path in &files {
        let stats = scan_capture_file(path)?;
        println!(
            "  {} ({} frames, {} rejected, {} trailing bytes)",
            path.display(),
            stats.frames,
            stats.rejected_total(),
            stats.trailing_bytes
        );
        for (reason, count) in &stats.rejected {
            println!("    {}: {}", reason, count);
        }
    }

    Ok(())
}
