use crate::models::{DisposalGuide, DisposalStream, WasteCategory};

fn stream_tips(stream: DisposalStream) -> &'static [&'static str] {
    match stream {
        DisposalStream::Recyclable => &[
            "Clean and dry the item before recycling",
            "Place in the blue recycling bin",
            "Check local recycling guidelines for specific items",
            "Remove any non-recyclable components",
            "Wash containers to remove food residue",
        ],
        DisposalStream::Wet => &[
            "Add to your compost bin or pile",
            "Use municipal organic waste collection if available",
            "Avoid adding meat or dairy in home compost",
            "Maintain a balance of green and brown materials",
            "Keep compost moist but not waterlogged",
        ],
        DisposalStream::Dry => &[
            "Never put it in household bins",
            "Take it to a designated collection point",
            "Wrap sharp or broken parts before handing it in",
            "Store it in a sealed, covered container until drop-off",
        ],
    }
}

fn stream_impact(stream: DisposalStream) -> &'static str {
    match stream {
        DisposalStream::Recyclable => "Recycling this item saves energy, reduces greenhouse gas emissions, \
                                       and conserves natural resources.",
        DisposalStream::Wet => "Composting organic waste prevents methane emissions from landfills and \
                                creates nutrient-rich soil.",
        DisposalStream::Dry => "Handled properly, this waste stays out of soil and water. Consider \
                                reducing consumption of similar items in the future.",
    }
}

fn category_examples(category: WasteCategory) -> &'static [&'static str] {
    match category {
        WasteCategory::Plastic => &["bottles", "food containers", "shopping bags"],
        WasteCategory::Paper => &["newspaper", "cardboard boxes", "office paper"],
        WasteCategory::Metal => &["drink cans", "tin cans", "aluminium foil"],
        WasteCategory::Glass => &["jars", "bottles"],
        WasteCategory::Organic => &["fruit peels", "vegetable scraps", "coffee grounds", "leaves"],
        WasteCategory::EWaste => &["phones", "chargers", "batteries", "cables"],
        WasteCategory::Hazardous => &["paint", "pesticides", "medicines", "cleaning chemicals"],
    }
}

/// Disposal guidance that ships with the bot, used when no guide webhook answers.
pub fn builtin_guide(category: WasteCategory) -> DisposalGuide {
    let stream = category.stream();

    DisposalGuide {
        category: category.to_string(),
        tips: stream_tips(stream).iter().map(|s| s.to_string()).collect(),
        examples: category_examples(category).iter().map(|s| s.to_string()).collect(),
        environmental_impact: stream_impact(stream).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_a_complete_guide() {
        for category in WasteCategory::ALL {
            let guide = builtin_guide(category);
            assert_eq!(guide.category, category.as_str());
            assert!(!guide.tips.is_empty());
            assert!(!guide.examples.is_empty());
            assert!(!guide.environmental_impact.is_empty());
        }
    }

    #[test]
    fn categories_in_a_stream_share_tips() {
        assert_eq!(
            builtin_guide(WasteCategory::Paper).tips,
            builtin_guide(WasteCategory::Glass).tips
        );
        assert_ne!(
            builtin_guide(WasteCategory::Paper).tips,
            builtin_guide(WasteCategory::Organic).tips
        );
    }
}
