use criterion::{Criterion, black_box, criterion_group, criterion_main};

use quarry::analysis::splitter::{SplitFlags, SplitParams, TermSink, TextSplitter};

struct Count(usize);
impl TermSink for Count {
    fn take_word(&mut self, _t: &str, _p: u32, _s: usize, _e: usize) -> bool {
        self.0 += 1;
        true
    }
}

fn sample_text() -> String {
    let para = "It is a truth universally acknowledged, that a single man in \
                possession of a good fortune, must be in want of a wife. \
                Write to jf.dockes@wanadoo.fr about release 2024-01-31, or \
                check the c++ sources under /home/me/src. ";
    para.repeat(200)
}

fn bench_splitter(c: &mut Criterion) {
    let text = sample_text();
    let mut group = c.benchmark_group("splitter");
    group.bench_function("words_and_spans", |b| {
        b.iter(|| {
            let mut sink = Count(0);
            let mut sp = TextSplitter::new(SplitFlags::empty(), SplitParams::default());
            sp.text_to_words(black_box(&text), &mut sink);
            sink.0
        })
    });
    group.bench_function("spans_only", |b| {
        b.iter(|| {
            let mut sink = Count(0);
            let mut sp = TextSplitter::new(SplitFlags::ONLY_SPANS, SplitParams::default());
            sp.text_to_words(black_box(&text), &mut sink);
            sink.0
        })
    });
    group.finish();
}

criterion_group!(benches, bench_splitter);
criterion_main!(benches);
