use criterion::{Criterion, black_box, criterion_group, criterion_main};
use hls_relay::hls::{classify, rewrite_playlist};
use url::Url;

/// Live media playlist with `segments` entries, mixing relative and absolute references.
fn media_playlist(segments: usize) -> String {
    let mut out = String::from(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:1000\n",
    );
    for i in 0..segments {
        out.push_str("#EXTINF:6.006,\n");
        if i % 4 == 0 {
            out.push_str(&format!(
                "https://edge.example.com/live/ch1/seg_{i}.ts?token=abc123&exp=1700000000\n"
            ));
        } else {
            out.push_str(&format!("../ch1/seg_{i}.ts\n"));
        }
    }
    out
}

fn bench_rewrite(c: &mut Criterion) {
    let base = Url::parse("https://origin.example.com/live/ch1/index.m3u8").unwrap();

    for segments in [10, 500] {
        let playlist = media_playlist(segments);
        c.bench_function(&format!("rewrite_{segments}_segments"), |b| {
            b.iter(|| {
                rewrite_playlist(
                    black_box(&playlist),
                    black_box(&base),
                    "https://relay.example.com",
                )
                .unwrap()
            })
        });
    }
}

fn bench_classify(c: &mut Criterion) {
    let url = Url::parse("https://edge.example.com/live/ch1/seg_42.ts?token=abc").unwrap();
    c.bench_function("classify_segment", |b| {
        b.iter(|| classify(black_box(Some("video/MP2T")), black_box(&url)))
    });
}

criterion_group!(benches, bench_rewrite, bench_classify);
criterion_main!(benches);
