use std::path::Path;

/// File name generated scripts are told to save to.
pub const PLACEHOLDER_OUTPUT: &str = "generated_diagram.png";

/// A literal find/replace fix for something the model reliably gets wrong.
#[derive(Debug, Clone, Copy)]
pub struct Correction {
    pub pattern: &'static str,
    pub replacement: &'static str,
}

/// Applied in order. Replacements must not reintroduce their own pattern.
pub const CORRECTIONS: &[Correction] = &[
    Correction {
        pattern: "```python",
        replacement: "",
    },
    Correction {
        pattern: "```",
        replacement: "",
    },
    // mathtext has no \implies
    Correction {
        pattern: r"\implies",
        replacement: r"\Rightarrow",
    },
];

/// Render a path with forward slashes so it can be embedded in a script
/// string literal on any host.
pub fn portable_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub fn sanitize(source: &str, target: &Path) -> String {
    sanitize_with(source, target, CORRECTIONS)
}

/// Apply `corrections`, then point the script at `target`.
///
/// Corrections run first so that a placeholder only completed by removing
/// a fence is still rewritten. Total and idempotent for any target that
/// does not itself contain the placeholder name or a correction pattern.
pub fn sanitize_with(source: &str, target: &Path, corrections: &[Correction]) -> String {
    let mut out = source.to_string();
    for correction in corrections {
        if out.contains(correction.pattern) {
            out = out.replace(correction.pattern, correction.replacement);
        }
    }
    out.replace(PLACEHOLDER_OUTPUT, &portable_path(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SCRIPT: &str = "x=1\nplt.savefig('generated_diagram.png')";

    #[test]
    fn test_rewrites_placeholder_to_target() {
        let out = sanitize(SCRIPT, Path::new("out/diag_1.png"));
        assert!(out.contains("out/diag_1.png"));
        assert!(!out.contains(PLACEHOLDER_OUTPUT));
        assert_eq!(out, "x=1\nplt.savefig('out/diag_1.png')");
    }

    #[test]
    fn test_backslashes_become_forward_slashes() {
        let target = PathBuf::from(r"diagram_code\diag_img_a_1.png");
        let out = sanitize(SCRIPT, &target);
        assert!(out.contains("diagram_code/diag_img_a_1.png"));
        assert!(!out.contains('\\'));
    }

    #[test]
    fn test_no_matches_returns_input() {
        let src = "import numpy as np\nprint(np.pi)";
        assert_eq!(sanitize(src, Path::new("x.png")), src);
    }

    #[test]
    fn test_fixes_implies_macro() {
        let src = r"ax.set_title(r'$A \implies B$')";
        let out = sanitize(src, Path::new("x.png"));
        assert_eq!(out, r"ax.set_title(r'$A \Rightarrow B$')");
    }

    #[test]
    fn test_strips_markdown_fences() {
        let src = "```python\nimport matplotlib.pyplot as plt\nplt.savefig('generated_diagram.png')\n```";
        let out = sanitize(src, Path::new("w/d.png"));
        assert!(!out.contains("```"));
        assert!(!out.contains("python\n"));
        assert!(out.contains("import matplotlib.pyplot as plt"));
        assert!(out.contains("plt.savefig('w/d.png')"));
    }

    #[test]
    fn test_idempotent() {
        let target = Path::new("diagram_code/diag_img_notesjpg_1.png");
        let src = "```python\nplt.title(r'$p \\implies q$')\nplt.savefig('generated_diagram.png')\n```";
        let once = sanitize(src, target);
        let twice = sanitize(&once, target);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_placeholder_split_by_fence_is_rewritten() {
        let src = "plt.savefig('generated_```diagram.png')";
        let target = Path::new("out/d.png");
        let once = sanitize(src, target);
        assert_eq!(once, "plt.savefig('out/d.png')");
        assert!(!once.contains(PLACEHOLDER_OUTPUT));
        assert_eq!(sanitize(&once, target), once);
    }

    #[test]
    fn test_custom_correction_table() {
        let table = [Correction {
            pattern: "plt.show()",
            replacement: "",
        }];
        let out = sanitize_with("plt.plot([1])\nplt.show()", Path::new("a.png"), &table);
        assert_eq!(out, "plt.plot([1])\n");
    }

    #[test]
    fn test_corrections_do_not_reintroduce_patterns() {
        for c in CORRECTIONS {
            assert!(!c.replacement.contains(c.pattern), "{} is not idempotent", c.pattern);
        }
    }
}
