#![allow(dead_code)]

pub mod fixture_server;

use std::path::Path;

/// Three news channels and two documentaries, no logos.
pub const SAMPLE_M3U: &str = "#EXTM3U
#EXTINF:-1 tvg-id=\"fox\" group-title=\"News\",FOX TV
http://streams/fox.m3u8
#EXTINF:-1 tvg-id=\"trt1\" group-title=\"News\",TRT 1
http://streams/trt1.m3u8
#EXTINF:-1 tvg-id=\"cnn\" group-title=\"News\",CNN International
http://streams/cnn.m3u8
#EXTINF:-1 tvg-id=\"natgeo\" group-title=\"Documentary\",Nat Geo
http://streams/natgeo.m3u8
#EXTINF:-1 tvg-id=\"belgesel\" group-title=\"Documentary\",TRT Belgesel
http://streams/belgesel.m3u8
";

pub fn write_playlist(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

/// (category id, channel id) as the parser derives them.
pub fn key(category: &str, tvg_id: &str) -> (String, String) {
    (
        iptv_core::m3u::encode_id(category),
        iptv_core::m3u::encode_id(tvg_id),
    )
}
