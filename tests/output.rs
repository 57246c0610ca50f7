use taskmaster::output::{format_human, HumanOutput};

#[test]
fn format_human_includes_sections() {
    let mut human = HumanOutput::new("Task added");
    human.push_summary("Title", "Pay rent");
    human.push_detail("[ ] 01hzxk2a [high][finance] Pay rent");
    human.push_warning("\"Pay rent\" is due soon");
    human.push_next_step("tm list");

    let rendered = format_human(&human);
    assert!(rendered.starts_with("Task added"));
    assert!(rendered.contains("Summary:"));
    assert!(rendered.contains("- Title: Pay rent"));
    assert!(rendered.contains("Details:"));
    assert!(rendered.contains("- [ ] 01hzxk2a [high][finance] Pay rent"));
    assert!(rendered.contains("Warnings:"));
    assert!(rendered.contains("Next steps:"));
    assert!(rendered.contains("- tm list"));
}

#[test]
fn format_human_omits_empty_sections() {
    let human = HumanOutput::new("tm init: already initialized");
    let rendered = format_human(&human);
    assert_eq!(rendered, "tm init: already initialized");
}
