// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mcp_bridge::bridge::ToolRouter;
use mcp_bridge::config::BridgeConfig;
use mcp_bridge::mcp::codec::McpCodec;
use tokio_util::codec::Decoder;

fn bench_codec_decode(c: &mut Criterion) {
    let mut codec = McpCodec::new();
    let line = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"ok\"}]}}\n";
    let framed = b"Content-Length: 43\r\n\r\n{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}";

    c.bench_function("codec_decode_newline", |b| {
        b.iter(|| {
            let mut src = BytesMut::from(&line[..]);
            let _ = codec.decode(black_box(&mut src));
        })
    });

    c.bench_function("codec_decode_content_length", |b| {
        b.iter(|| {
            let mut src = BytesMut::from(&framed[..]);
            let _ = codec.decode(black_box(&mut src));
        })
    });
}

fn bench_router_resolve(c: &mut Criterion) {
    let router = ToolRouter::from_config(&BridgeConfig::builtin());

    c.bench_function("router_resolve_first_rule", |b| {
        b.iter(|| router.resolve(black_box("docker_ps")).len())
    });

    c.bench_function("router_resolve_default", |b| {
        b.iter(|| router.resolve(black_box("totally_unknown_tool")).len())
    });
}

criterion_group!(benches, bench_codec_decode, bench_router_resolve);
criterion_main!(benches);
