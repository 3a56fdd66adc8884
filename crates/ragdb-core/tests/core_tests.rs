use ragdb_core::chunker::Chunker;
use ragdb_core::config::ChunkingConfig;

fn chunker(chunk_size: usize, overlap: usize) -> Chunker {
    Chunker::new(&ChunkingConfig { chunk_size, overlap }).expect("valid chunking config")
}

#[test]
fn short_text_yields_exactly_one_chunk() {
    let chunks = chunker(200, 50).chunk("Short text");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0], "Short text");
}

#[test]
fn chunking_is_deterministic() {
    let text = "First paragraph about goats.\n\nSecond paragraph about fencing \
                that runs a little longer than the first one.\n\nThird paragraph.";
    let c = chunker(80, 20);
    assert_eq!(c.chunk(text), c.chunk(text));
}

#[test]
fn paragraphs_pack_up_to_chunk_size() {
    let text = "aaaa\n\nbbbb\n\ncccc";
    // All three paragraphs fit in one 200-char chunk.
    let chunks = chunker(200, 50).chunk(text);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0], "aaaa\n\nbbbb\n\ncccc");
}

#[test]
fn long_paragraph_splits_into_overlapping_windows() {
    let text: String = std::iter::repeat('x').take(500).collect();
    let chunks = chunker(200, 50).chunk(&text);
    // Windows advance by 150 chars: starts at 0, 150, 300, 450.
    assert_eq!(chunks.len(), 4);
    for c in &chunks[..chunks.len() - 1] {
        assert_eq!(c.chars().count(), 200);
    }
    // Final chunk holds the remainder and may be shorter.
    assert_eq!(chunks.last().expect("non-empty").chars().count(), 50);
}

#[test]
fn windows_share_overlap_characters() {
    let text: String = ('a'..='z').cycle().take(300).collect();
    let chunks = chunker(100, 30).chunk(&text);
    assert!(chunks.len() >= 2);
    let first: Vec<char> = chunks[0].chars().collect();
    let second: Vec<char> = chunks[1].chars().collect();
    // Last 30 chars of chunk N are the first 30 of chunk N+1.
    assert_eq!(&first[first.len() - 30..], &second[..30]);
}

#[test]
fn whitespace_only_text_yields_no_chunks() {
    assert!(chunker(200, 50).chunk("  \n\n \t \n\n").is_empty());
}

#[test]
fn overlap_equal_to_chunk_size_is_rejected() {
    assert!(Chunker::new(&ChunkingConfig { chunk_size: 100, overlap: 100 }).is_err());
}

#[test]
fn multibyte_text_splits_on_character_boundaries() {
    let text: String = std::iter::repeat('é').take(250).collect();
    let chunks = chunker(100, 10).chunk(&text);
    assert!(chunks.len() >= 2);
    for c in &chunks {
        assert!(c.chars().count() <= 100);
    }
}

#[test]
fn three_paragraph_file_chunks_into_expected_range() {
    let text = format!(
        "{}\n\n{}\n\n{}",
        "The homestead keeps three goats and a small flock of hens near the barn.",
        "Fencing the lower paddock took two weekends; the posts went in first, then \
         the wire mesh, and finally a gate salvaged from the old orchard entrance.",
        "Water comes from the spring uphill, gravity-fed through a buried line."
    );
    let chunks = chunker(200, 50).chunk(&text);
    assert!(
        (2..=5).contains(&chunks.len()),
        "expected a handful of chunks, got {}",
        chunks.len()
    );
}
