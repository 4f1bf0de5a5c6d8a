use crate::caption::metrics::TextMetrics;
use crate::foundation::core::Fps;

/// One overlay step: the wrapped lines visible from `frame_index` until the next frame starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptionFrame {
    pub lines: Vec<String>,
    pub font_size: u32,
    pub frame_index: u64,
    /// Smaller preview of the words about to be spoken (timed layout only).
    pub upcoming: Option<UpcomingPreview>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpcomingPreview {
    pub lines: Vec<String>,
    pub font_size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptionLayoutOpts {
    /// Horizontal inset on each side of the canvas, in pixels.
    pub padding: f32,
    /// Font size decrement per shrink iteration.
    pub font_step: u32,
    /// Floor below which lines are truncated instead of shrunk.
    pub min_font_size: u32,
}

impl Default for CaptionLayoutOpts {
    fn default() -> Self {
        Self {
            padding: 20.0,
            font_step: 2,
            min_font_size: 14,
        }
    }
}

/// Parameters for the word-synchronized rolling caption.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptionTiming {
    /// Words shown in the current window (`N`).
    pub window_words: usize,
    /// Words shown in the upcoming preview (`M`). Zero disables the preview.
    pub preview_words: usize,
    pub duration_secs: f64,
    pub fps: Fps,
}

/// Greedy word wrapping with font-size fitting.
#[derive(Clone, Debug)]
pub struct CaptionLayoutEngine<M> {
    metrics: M,
    opts: CaptionLayoutOpts,
}

impl<M: TextMetrics> CaptionLayoutEngine<M> {
    pub fn new(metrics: M) -> Self {
        Self::with_opts(metrics, CaptionLayoutOpts::default())
    }

    pub fn with_opts(metrics: M, opts: CaptionLayoutOpts) -> Self {
        Self { metrics, opts }
    }

    pub fn opts(&self) -> CaptionLayoutOpts {
        self.opts
    }

    pub fn metrics(&self) -> &M {
        &self.metrics
    }

    /// Static caption: the whole text fitted into at most `max_lines` lines.
    pub fn layout(
        &self,
        text: &str,
        canvas_width: u32,
        max_lines: usize,
        base_font_size: u32,
    ) -> Vec<CaptionFrame> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return vec![empty_frame(base_font_size)];
        }
        let (lines, font_size) = self.fit(&words, canvas_width, max_lines, base_font_size);
        vec![CaptionFrame {
            lines,
            font_size,
            frame_index: 0,
            upcoming: None,
        }]
    }

    /// Rolling caption advancing one word per `duration / word_count` seconds.
    ///
    /// Frame `i` starts at `floor(i × duration / word_count × fps)` and shows the last
    /// `window_words` words ending at word `i`, plus a preview of the next `preview_words`.
    pub fn layout_timed(
        &self,
        text: &str,
        canvas_width: u32,
        max_lines: usize,
        base_font_size: u32,
        timing: CaptionTiming,
    ) -> Vec<CaptionFrame> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return vec![empty_frame(base_font_size)];
        }

        let window = timing.window_words.max(1);
        let secs_per_word = timing.duration_secs.max(0.0) / words.len() as f64;
        let preview_size = self.preview_font_size(base_font_size);

        (0..words.len())
            .map(|i| {
                let start = (i + 1).saturating_sub(window);
                let (lines, font_size) =
                    self.fit(&words[start..=i], canvas_width, max_lines, base_font_size);

                let preview_end = (i + 1 + timing.preview_words).min(words.len());
                let upcoming = (timing.preview_words > 0 && i + 1 < preview_end).then(|| {
                    let (lines, font_size) =
                        self.fit(&words[i + 1..preview_end], canvas_width, 1, preview_size);
                    UpcomingPreview { lines, font_size }
                });

                CaptionFrame {
                    lines,
                    font_size,
                    frame_index: timing.fps.secs_to_frames_floor(i as f64 * secs_per_word),
                    upcoming,
                }
            })
            .collect()
    }

    fn preview_font_size(&self, base_font_size: u32) -> u32 {
        (base_font_size * 2 / 3).max(self.opts.min_font_size)
    }

    fn available_width(&self, canvas_width: u32) -> f32 {
        (canvas_width as f32 - 2.0 * self.opts.padding).max(0.0)
    }

    /// Shrink until the wrapped text fits `max_lines`, truncating once the floor is reached.
    fn fit(
        &self,
        words: &[&str],
        canvas_width: u32,
        max_lines: usize,
        base_font_size: u32,
    ) -> (Vec<String>, u32) {
        let max_lines = max_lines.max(1);
        let available = self.available_width(canvas_width);
        let mut font_size = base_font_size.max(1);

        loop {
            let mut lines = self.wrap(words, available, font_size);
            if lines.len() <= max_lines {
                return (lines, font_size);
            }
            if self.opts.font_step == 0 || font_size <= self.opts.min_font_size.max(1) {
                lines.truncate(max_lines);
                return (lines, font_size);
            }
            // Land on the floor itself when the step overshoots it.
            font_size = font_size
                .saturating_sub(self.opts.font_step)
                .max(self.opts.min_font_size)
                .max(1);
        }
    }

    fn wrap(&self, words: &[&str], available: f32, font_size: u32) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();

        for word in words {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{current} {word}");
            if self.metrics.line_width(&candidate, font_size) <= available {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, (*word).to_string()));
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }
}

fn empty_frame(font_size: u32) -> CaptionFrame {
    CaptionFrame {
        lines: Vec::new(),
        font_size,
        frame_index: 0,
        upcoming: None,
    }
}

/// Index of the caption frame active at `frame`: the last one starting at or before it.
///
/// `captions` must be ordered by `frame_index`, as both layouts produce them.
pub fn active_caption_index(captions: &[CaptionFrame], frame: u64) -> Option<usize> {
    captions
        .partition_point(|c| c.frame_index <= frame)
        .checked_sub(1)
}

pub fn active_caption(captions: &[CaptionFrame], frame: u64) -> Option<&CaptionFrame> {
    active_caption_index(captions, frame).map(|i| &captions[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::metrics::FixedAdvanceMetrics;

    // 0.5em advance: at 40px every character is 20px, so 440px of usable width holds 22 chars.
    fn engine() -> CaptionLayoutEngine<FixedAdvanceMetrics> {
        CaptionLayoutEngine::new(FixedAdvanceMetrics {
            advance_em: 0.5,
            line_height_em: 1.2,
        })
    }

    const LOREM: &str = "the quick brown fox jumps over the lazy dog while a curious cat \
        watches from the warm windowsill and wonders why anyone would bother";

    #[test]
    fn empty_text_yields_single_empty_frame() {
        let frames = engine().layout("   ", 480, 3, 40);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].lines.is_empty());
        assert_eq!(frames[0].frame_index, 0);
    }

    #[test]
    fn lines_never_exceed_available_width() {
        let e = engine();
        for base in [24, 32, 40, 48] {
            for frame in e.layout(LOREM, 480, 10, base) {
                for line in &frame.lines {
                    let w = e.metrics().line_width(line, frame.font_size);
                    assert!(w <= 440.0 || !line.contains(' '), "{line:?} is {w}px");
                }
            }
        }
    }

    #[test]
    fn layout_is_deterministic() {
        let e = engine();
        assert_eq!(e.layout(LOREM, 480, 3, 40), e.layout(LOREM, 480, 3, 40));
    }

    #[test]
    fn over_wide_word_gets_its_own_line() {
        let word = "x".repeat(40);
        let text = format!("a {word} b");
        let frames = engine().layout(&text, 480, 5, 40);
        assert_eq!(frames[0].lines, vec!["a".to_string(), word, "b".to_string()]);
    }

    #[test]
    fn shrinks_until_lines_fit() {
        let frames = engine().layout(LOREM, 480, 4, 40);
        let frame = &frames[0];
        assert!(frame.font_size < 40);
        assert!(frame.font_size >= 14);
        assert!(frame.lines.len() <= 4);
        assert_eq!(frame.lines.join(" "), LOREM.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    #[test]
    fn truncates_at_min_font_size() {
        let text = LOREM.repeat(6);
        let frames = engine().layout(&text, 480, 2, 40);
        assert_eq!(frames[0].font_size, 14);
        assert_eq!(frames[0].lines.len(), 2);
    }

    #[test]
    fn odd_base_size_still_tries_the_floor() {
        // 59 chars: two lines at 15px, one line at 14px. 33 steps down by 2 to 15, then 14.
        let text = LOREM.split_whitespace().take(12).collect::<Vec<_>>().join(" ");
        let frames = engine().layout(&text, 480, 1, 33);
        assert_eq!(frames[0].font_size, 14);
        assert_eq!(frames[0].lines, vec![text]);
    }

    #[test]
    fn base_below_floor_is_kept() {
        let frames = engine().layout(&LOREM.repeat(3), 480, 1, 10);
        assert_eq!(frames[0].font_size, 10);
        assert_eq!(frames[0].lines.len(), 1);
    }

    #[test]
    fn timed_layout_rolls_one_word_per_step() {
        let timing = CaptionTiming {
            window_words: 3,
            preview_words: 2,
            duration_secs: 2.0,
            fps: Fps::whole(30).unwrap(),
        };
        let frames = engine().layout_timed("one two three four five", 480, 2, 40, timing);
        assert_eq!(frames.len(), 5);

        let starts: Vec<u64> = frames.iter().map(|f| f.frame_index).collect();
        assert_eq!(starts, vec![0, 12, 24, 36, 48]);

        assert_eq!(frames[0].lines, vec!["one"]);
        assert_eq!(frames[3].lines, vec!["two three four"]);
        assert_eq!(
            frames[1].upcoming.as_ref().map(|u| u.lines.clone()),
            Some(vec!["three four".to_string()])
        );
        assert!(frames[1].upcoming.as_ref().unwrap().font_size < frames[1].font_size);
        assert!(frames[4].upcoming.is_none());
    }

    #[test]
    fn active_caption_picks_last_started_frame() {
        let timing = CaptionTiming {
            window_words: 1,
            preview_words: 0,
            duration_secs: 1.0,
            fps: Fps::whole(10).unwrap(),
        };
        let frames = engine().layout_timed("a b", 480, 1, 40, timing);
        assert_eq!(active_caption(&frames, 0).unwrap().lines, vec!["a"]);
        assert_eq!(active_caption(&frames, 4).unwrap().lines, vec!["a"]);
        assert_eq!(active_caption(&frames, 5).unwrap().lines, vec!["b"]);
        assert_eq!(active_caption(&frames, 99).unwrap().lines, vec!["b"]);
        assert!(active_caption(&[], 0).is_none());
    }

    #[test]
    fn later_caption_wins_on_shared_start_frame() {
        let frame = |idx| CaptionFrame {
            lines: vec![format!("f{idx}")],
            font_size: 20,
            frame_index: idx,
            upcoming: None,
        };
        let captions = vec![frame(0), frame(10), frame(10), frame(25)];
        assert_eq!(active_caption_index(&captions, 9), Some(0));
        assert_eq!(active_caption_index(&captions, 10), Some(2));
        assert_eq!(active_caption_index(&captions, 30), Some(3));
    }
}
