use super::*;
use crate::RagError;

fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
    ChunkingConfig {
        chunk_size,
        chunk_overlap,
    }
}

/// Text with no separators at all, so windows are cut at exact character counts
fn unbroken_text(len: usize) -> String {
    (0..len)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect()
}

fn prose(paragraphs: usize) -> String {
    (0..paragraphs)
        .map(|p| {
            format!(
                "Paragraph {} talks about topic {}. It has a second sentence! Does it ask a question? \
                 Then it continues with more words on the same line\nand wraps onto another line.",
                p,
                p * 7
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn reconstruct(windows: &[TextWindow], overlap: usize) -> String {
    let mut text = String::new();
    for (i, window) in windows.iter().enumerate() {
        if i == 0 {
            text.push_str(&window.content);
        } else {
            text.extend(window.content.chars().skip(overlap));
        }
    }
    text
}

#[test]
fn twenty_five_thousand_characters() {
    let text = unbroken_text(25_000);
    let windows = split_text(&text, &ChunkingConfig::default()).expect("split should succeed");

    let lengths: Vec<usize> = windows.iter().map(TextWindow::char_count).collect();
    assert_eq!(lengths, vec![10_000, 10_000, 7_000]);
    assert_eq!(
        windows.iter().map(|w| w.start).collect::<Vec<_>>(),
        vec![0, 9_000, 18_000]
    );

    for pair in windows.windows(2) {
        let tail: String = pair[0].content.chars().skip(10_000 - 1_000).collect();
        let head: String = pair[1].content.chars().take(1_000).collect();
        assert_eq!(tail, head);
    }
}

#[test]
fn reconstructs_prose_exactly() {
    let text = prose(60);
    for (size, overlap) in [(200, 20), (500, 100), (1000, 0), (64, 63)] {
        let cfg = config(size, overlap);
        let windows = split_text(&text, &cfg).expect("split should succeed");

        assert_eq!(reconstruct(&windows, overlap), text, "size {size} overlap {overlap}");
        assert!(windows.iter().all(|w| w.char_count() <= size));

        for pair in windows.windows(2) {
            let prev_len = pair[0].char_count();
            let tail: String = pair[0].content.chars().skip(prev_len - overlap).collect();
            let head: String = pair[1].content.chars().take(overlap).collect();
            assert_eq!(tail, head);
        }
    }
}

#[test]
fn prefers_paragraph_boundaries() {
    let first = "a".repeat(70);
    let second = "b".repeat(70);
    let text = format!("{first}\n\n{second}");

    let windows = split_text(&text, &config(100, 10)).expect("split should succeed");

    assert_eq!(windows[0].content, format!("{first}\n\n"));
    assert!(windows[1].content.ends_with(&second));
}

#[test]
fn chunk_count_matches_step() {
    for len in [1, 999, 1000, 1001, 5_000, 12_345] {
        let text = unbroken_text(len);
        let windows = split_text(&text, &config(1000, 100)).expect("split should succeed");
        let expected = if len <= 1000 {
            1
        } else {
            (len - 100).div_ceil(900)
        };
        assert_eq!(windows.len(), expected, "length {len}");
    }
}

#[test]
fn multibyte_text_is_measured_in_characters() {
    let text = "é🦀".repeat(300);
    let windows = split_text(&text, &config(100, 10)).expect("split should succeed");

    assert!(windows.iter().all(|w| w.char_count() <= 100));
    assert_eq!(reconstruct(&windows, 10), text);
}

#[test]
fn invalid_overlap_is_rejected() {
    let result = split_text("some text", &config(100, 100));
    assert!(matches!(result, Err(RagError::Config(_))));

    let result = split_text("some text", &config(0, 0));
    assert!(matches!(result, Err(RagError::Config(_))));
}

#[test]
fn whitespace_only_text_yields_nothing() {
    let windows = split_text(" \n\n\t ", &ChunkingConfig::default()).expect("split should succeed");
    assert!(windows.is_empty());
}

#[test]
fn documents_keep_source_and_index() {
    let documents = vec![
        Document {
            source: PathBuf::from("data/a.pdf"),
            text: unbroken_text(250),
        },
        Document {
            source: PathBuf::from("data/b.pdf"),
            text: "short".to_string(),
        },
    ];

    let chunks = split_documents(&documents, &config(100, 10)).expect("split should succeed");

    let a: Vec<&Chunk> = chunks
        .iter()
        .filter(|c| c.source == PathBuf::from("data/a.pdf"))
        .collect();
    assert_eq!(a.len(), 3);
    assert_eq!(
        a.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(a[1].start, 90);
    assert_eq!(a[2].char_count, 70);

    let b = chunks.last().expect("b should have a chunk");
    assert_eq!(b.source, PathBuf::from("data/b.pdf"));
    assert_eq!(b.chunk_index, 0);
    assert_eq!(b.content, "short");
}
