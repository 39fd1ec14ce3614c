//! Remote content fixtures

use stockfetch::MemoryTransferClient;

/// In-memory ZIP with the given stored members
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content).unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}

/// A typical drop directory: one entry per outcome kind, nothing in any ledger yet
///
/// | entry | expected outcome |
/// |---|---|
/// | `shutterstock_100.jpg` | downloaded |
/// | `depositphoto_abc.rar` | downloaded |
/// | `AdobeStock_7.zip` | downloaded into fotolia |
/// | `shutterstock_100 (1).jpg` | duplicate suffix |
/// | `pond5_9.mov` | unrecognized prefix |
/// | `notes.txt` | unrecognized prefix |
/// | `old_drops` | directory |
pub fn mixed_drop() -> MemoryTransferClient {
    MemoryTransferClient::new()
        .with_file("shutterstock_100.jpg", "jpeg bytes")
        .with_file("depositphoto_abc.rar", "rar bytes")
        .with_file("AdobeStock_7.zip", "zip bytes")
        .with_file("shutterstock_100 (1).jpg", "jpeg bytes")
        .with_file("pond5_9.mov", "mov bytes")
        .with_file("notes.txt", "text")
        .with_directory("old_drops")
}
