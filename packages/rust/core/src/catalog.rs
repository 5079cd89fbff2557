//! The standard shallow-dive stage list.
//!
//! Two research stages followed by twenty-five narrative sections. Each
//! narrative section is a row of data in [`SECTIONS`]; [`standard_stages`]
//! turns the table into stages in fixed report order.

use shallowdive_shared::DataKind::{CompanyProfile, FinancialMetrics, MarketData};
use shallowdive_shared::{DataKind, Result};

use crate::collaborators::Toolkit;
use crate::pipeline::Pipeline;
use crate::stage::{NarrativeStage, ResearchStage, Stage};

/// Name of the first stage. It resets run state.
pub const INITIALIZE: &str = "initialize";
/// Name of the raw financial data stage.
pub const GATHER_FINANCIALS: &str = "gather_financials";
/// Key of the stage whose text carries the recommendation.
pub const VALUATION_STAGE: &str = "section_6_3";

/// Instructions sent with every narration.
pub const ANALYST_SYSTEM_PROMPT: &str = "\
You are an equity research analyst writing for a patient, long-term owner of the business. \
The reader prefers mechanisms to stories, structural advantages to momentum, and claims that \
could be proven wrong to optimism.

Style:
1. Concise paragraphs of prose. Do not use bullet points unless a table is requested.
2. Each paragraph states a claim, gives the evidence, then draws the implication.
3. Prefer exact figures, percentages and dates to adjectives.
4. Explain the structural drivers behind each number.

Citations:
1. Cite factual claims as [n], where n is a source number given in the context.
2. Put the citation at the end of the claim, before the period. Stack them as [1][2].
3. Cite only numbers that appear in the context. Never invent a source number.";

/// Prior section quoted in a prompt: key, label, character budget.
pub type Prior = (&'static str, &'static str, usize);

/// One narrative section of the report.
#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub key: &'static str,
    pub part: &'static str,
    pub heading: &'static str,
    pub queries: &'static [&'static str],
    pub priors: &'static [Prior],
    pub payloads: &'static [(DataKind, usize)],
    pub window: usize,
    pub instructions: &'static str,
}

const PROFILE: &str = "SECTION 1: PROFILE";
const THESIS: &str = "SECTION 2: INVESTMENT THESIS";
const INDUSTRY: &str = "SECTION 3: INDUSTRY";
const ADVANTAGE: &str = "SECTION 4: COMPETITIVE ADVANTAGE";
const RISKS: &str = "SECTION 5: RISKS";
const VALUATION: &str = "SECTION 6: VALUATION";
const IDENTIFICATION: &str = "SECTION 7: IDENTIFICATION";
const ENGAGEMENT: &str = "SECTION 8: ENGAGEMENT";

pub static SECTIONS: &[SectionSpec] = &[
    // -- Part 1 ------------------------------------------------------------
    SectionSpec {
        key: "section_1_1",
        part: PROFILE,
        heading: "1.1 Company Snapshot",
        queries: &[],
        priors: &[],
        payloads: &[(CompanyProfile, 3000), (FinancialMetrics, 3000)],
        window: 10,
        instructions: "Cover identity (business, geography, end customer), scale and free float, \
            through-cycle economics (growth, EBIT margin, ROIC, cash conversion), financial risk \
            (net debt to EBITDA, refinancing, currency mismatch) and headline valuation (P/E, \
            EV/EBIT, FCF yield). Close with the single variable the investment debate is most \
            sensitive to.",
    },
    SectionSpec {
        key: "section_1_2",
        part: PROFILE,
        heading: "1.2 What Does the Company Do?",
        queries: &["{company} business model value chain products services customers"],
        priors: &[("section_1_1", "Company Snapshot (1.1)", 1500)],
        payloads: &[(CompanyProfile, 2000)],
        window: 15,
        instructions: "Trace products and services to customer type and purchase model. Show where \
            profits concentrate geographically, where the company sits in its value chain, and \
            what the customer is really paying for.",
    },
    SectionSpec {
        key: "section_1_3",
        part: PROFILE,
        heading: "1.3 How Is Value Created? (DuPont Analysis)",
        queries: &[
            "{company} profitability margins pricing power",
            "{company} capital efficiency asset turnover working capital",
            "{company} leverage capital structure debt",
        ],
        priors: &[
            ("section_1_1", "Company Snapshot (1.1)", 1200),
            ("section_1_2", "Business Model (1.2)", 1200),
        ],
        payloads: &[(FinancialMetrics, 2000)],
        window: 20,
        instructions: "Decompose return on equity into margin, asset turnover and leverage. Name the \
            mechanism behind each component and say which one the returns pattern depends on.",
    },
    SectionSpec {
        key: "section_1_4",
        part: PROFILE,
        heading: "1.4 Theme Identification & Exposure",
        queries: &[
            "{company} emerging market themes trends exposure",
            "{company} digitalization energy transition sustainability",
            "{company} market positioning competitive advantages moat",
        ],
        priors: &[
            ("section_1_1", "Company Snapshot (1.1)", 1000),
            ("section_1_2", "Business Model (1.2)", 1000),
            ("section_1_3", "Value Creation (1.3)", 1000),
        ],
        payloads: &[],
        window: 20,
        instructions: "Identify the structural themes the company is exposed to and quantify how each \
            theme reaches revenue, margins or capital needs.",
    },
    SectionSpec {
        key: "section_1_5",
        part: PROFILE,
        heading: "1.5 Founders, Management, Shareholders",
        queries: &[
            "{company} ownership structure major shareholders control",
            "{company} management team CEO founders history",
            "{company} governance board composition incentives",
            "{company} capital allocation track record M&A",
        ],
        priors: &[
            ("section_1_1", "Company Snapshot (1.1)", 800),
            ("section_1_2", "Business Model (1.2)", 800),
            ("section_1_3", "Value Creation (1.3)", 800),
            ("section_1_4", "Themes (1.4)", 800),
        ],
        payloads: &[],
        window: 25,
        instructions: "Describe who controls the company and how, the history of founders and \
            management, how incentives are structured, and the capital allocation record.",
    },
    // -- Part 2 ------------------------------------------------------------
    SectionSpec {
        key: "section_2_1",
        part: THESIS,
        heading: "2.1 Key Value Drivers & Catalysts",
        queries: &[
            "{company} {ticker} key growth drivers catalysts",
            "{company} margin expansion pricing power trends",
            "{company} competitive advantages market position",
            "{company} industry trends tailwinds headwinds",
            "{company} management strategy capital allocation",
        ],
        priors: &[
            ("section_1_1", "Snapshot (1.1)", 800),
            ("section_1_3", "Value Creation (1.3)", 800),
            ("section_1_4", "Themes (1.4)", 800),
        ],
        payloads: &[(FinancialMetrics, 1500)],
        window: 20,
        instructions: "Name the three to five variables that move intrinsic value (volume, price, mix, \
            margin, capital intensity) and the catalysts that could change them within three years.",
    },
    SectionSpec {
        key: "section_2_2",
        part: THESIS,
        heading: "2.2 Implied Expectations",
        queries: &[
            "{company} {ticker} valuation expectations multiple",
            "{company} earnings expectations consensus {ticker}",
            "{company} market pricing growth vs margins",
        ],
        priors: &[
            ("section_2_1", "Value Drivers (2.1)", 1000),
            ("section_1_1", "Snapshot (1.1)", 600),
            ("section_1_3", "Value Creation (1.3)", 600),
        ],
        payloads: &[(FinancialMetrics, 1200)],
        window: 15,
        instructions: "Reverse-engineer the growth and margins the current price implies and compare \
            them with the company's own history.",
    },
    SectionSpec {
        key: "section_2_3",
        part: THESIS,
        heading: "2.3 Key Assumptions & Difference vs Consensus",
        queries: &["{company} {ticker} consensus estimates assumptions"],
        priors: &[
            ("section_2_1", "Value Drivers (2.1)", 800),
            ("section_2_2", "Implied Expectations (2.2)", 800),
        ],
        payloads: &[],
        window: 10,
        instructions: "State the assumptions where this view differs from consensus, why, and what \
            evidence would settle each disagreement.",
    },
    // -- Part 3 ------------------------------------------------------------
    SectionSpec {
        key: "section_3_1",
        part: INDUSTRY,
        heading: "3.1 Profit Pool & Value Chain",
        queries: &[
            "{company} industry value chain profit pool",
            "{company} industry pricing power drivers",
            "{company} key competitors positioning economics",
        ],
        priors: &[
            ("section_1_2", "Business Model (1.2)", 700),
            ("section_2_1", "Value Drivers (2.1)", 700),
        ],
        payloads: &[],
        window: 20,
        instructions: "Map the industry's profit pool along the value chain and show who captures the \
            economics and why.",
    },
    SectionSpec {
        key: "section_3_2",
        part: INDUSTRY,
        heading: "3.2 Market Structure (Five Forces)",
        queries: &["{company} industry five forces competition suppliers customers"],
        priors: &[("section_3_1", "Profit Pool (3.1)", 900)],
        payloads: &[],
        window: 15,
        instructions: "Assess rivalry, entry threat, substitutes, supplier power and buyer power, and \
            conclude which force caps industry returns.",
    },
    SectionSpec {
        key: "section_3_3",
        part: INDUSTRY,
        heading: "3.3 Industry Structure Classification & Positioning",
        queries: &["{company} industry structure classification fragmented mature network"],
        priors: &[("section_3_2", "Five Forces (3.2)", 800)],
        payloads: &[],
        window: 15,
        instructions: "Classify the industry structure (fragmented, consolidating, mature, network) and \
            state the rules of the game and where the company is positioned to win.",
    },
    // -- Part 4 ------------------------------------------------------------
    SectionSpec {
        key: "section_4_1",
        part: ADVANTAGE,
        heading: "4.1 ROIC Analysis vs Peers",
        queries: &["{company} {ticker} ROIC vs peers returns on capital"],
        priors: &[
            ("section_1_3", "Value Creation (1.3)", 700),
            ("section_3_3", "Industry Structure (3.3)", 600),
        ],
        payloads: &[(FinancialMetrics, 1200)],
        window: 15,
        instructions: "Compare ROIC with peers and with the cost of capital over a cycle, and explain \
            the spread.",
    },
    SectionSpec {
        key: "section_4_2",
        part: ADVANTAGE,
        heading: "4.2 Source of Enduring Competitive Advantage (7 Powers)",
        queries: &[
            "{company} competitive advantages moat barriers to entry",
            "{company} scale economies network effects switching costs",
            "{company} vs competitors differentiation positioning",
            "{company} intellectual property patents technology",
            "{company} customer retention pricing power brand",
        ],
        priors: &[
            ("section_1_2", "Business Model (1.2)", 800),
            ("section_1_3", "Value Creation (1.3)", 800),
            ("section_2_1", "Value Drivers (2.1)", 800),
        ],
        payloads: &[(FinancialMetrics, 1500)],
        window: 20,
        instructions: "Test each of the seven powers (scale economies, network economies, counter-\
            positioning, switching costs, branding, cornered resource, process power) against the \
            evidence. Name the powers that hold and the barrier that protects each.",
    },
    SectionSpec {
        key: "section_4_3",
        part: ADVANTAGE,
        heading: "4.3 Reinvestment Opportunity & Incremental Returns",
        queries: &["{company} TAM growth runway capital allocation {ticker}"],
        priors: &[
            ("section_4_2", "Competitive Advantage (4.2)", 800),
            ("section_2_1", "Value Drivers (2.1)", 700),
        ],
        payloads: &[],
        window: 15,
        instructions: "Size the reinvestment runway and estimate the incremental return on new capital \
            relative to the existing base.",
    },
    SectionSpec {
        key: "section_4_4",
        part: ADVANTAGE,
        heading: "4.4 Sustainability of Competitive Advantage",
        queries: &["{company} market share pricing power retention trends"],
        priors: &[
            ("section_4_2", "Competitive Advantage (4.2)", 800),
            ("section_4_3", "Reinvestment (4.3)", 600),
        ],
        payloads: &[],
        window: 15,
        instructions: "Judge whether the advantage is widening or eroding using share, pricing and \
            retention trends.",
    },
    // -- Part 5 ------------------------------------------------------------
    SectionSpec {
        key: "section_5_1",
        part: RISKS,
        heading: "5.1 Risk Identification, Quantification & Probability Assessment",
        queries: &[
            "{company} risks challenges headwinds concerns",
            "{company} regulatory risks compliance litigation",
            "{company} competitive threats market share pressure",
            "{company} financial leverage debt covenants liquidity",
            "{company} governance controversies related party transactions",
        ],
        priors: &[
            ("section_2_1", "Value Drivers (2.1)", 800),
            ("section_4_2", "Competitive Advantage (4.2)", 800),
        ],
        payloads: &[(FinancialMetrics, 1500)],
        window: 20,
        instructions: "Identify the material operational, financial, regulatory and governance risks. \
            For each, give a probability, the value at stake and the early warning signal.",
    },
    SectionSpec {
        key: "section_5_2",
        part: RISKS,
        heading: "5.2 Pre-Mortem Scenarios & Likelihood",
        queries: &["{company} {ticker} bear case risks scenarios"],
        priors: &[
            ("section_5_1", "Risks (5.1)", 900),
            ("section_2_1", "Value Drivers (2.1)", 600),
            ("section_4_2", "Competitive Advantage (4.2)", 600),
        ],
        payloads: &[],
        window: 10,
        instructions: "Assume the investment lost half its value in three years. Write the most likely \
            stories of how that happened and rate their likelihood.",
    },
    // -- Part 6 ------------------------------------------------------------
    SectionSpec {
        key: "section_6_1",
        part: VALUATION,
        heading: "6.1 Peer Review (Growth, Profitability, ROIC)",
        queries: &["{company} {ticker} peers profitability growth ROIC comparison"],
        priors: &[
            ("section_4_1", "ROIC (4.1)", 600),
            ("section_4_2", "Competitive Advantage (4.2)", 600),
        ],
        payloads: &[],
        window: 15,
        instructions: "Compare growth, margins, profitability and ROIC with the closest peers and \
            explain the gaps.",
    },
    SectionSpec {
        key: "section_6_2",
        part: VALUATION,
        heading: "6.2 Relative Valuation (Peers & History)",
        queries: &["{company} {ticker} valuation peers premium discount history multiples"],
        priors: &[
            ("section_6_1", "Peer Review (6.1)", 700),
            ("section_4_1", "ROIC (4.1)", 600),
        ],
        payloads: &[(MarketData, 800)],
        window: 15,
        instructions: "Place current multiples against peers and the company's own history and say \
            whether the premium or discount is earned.",
    },
    SectionSpec {
        key: "section_6_3",
        part: VALUATION,
        heading: "6.3 Three-Year Price Target & Scenarios",
        queries: &[
            "{company} {ticker} valuation price target analyst estimates",
            "{company} peer valuation multiples comparison",
            "{company} historical valuation PE ratio trends",
            "{ticker} stock price forecast 2027 2028",
        ],
        priors: &[
            ("section_2_1", "Value Drivers (2.1)", 1000),
            ("section_4_2", "Competitive Advantage (4.2)", 1000),
            ("section_5_1", "Risks (5.1)", 1000),
            ("section_1_1", "Snapshot (1.1)", 800),
        ],
        payloads: &[(FinancialMetrics, 1500), (MarketData, 800)],
        window: 15,
        instructions: "Build bear, base and bull cases for revenue, margin and multiple three years out, \
            as two Markdown tables (revenue scenarios; margin and multiple scenarios). Justify the \
            target multiple against the competitive advantage and the risks.

End with these lines, filled in:
Base Target: $<price>
Upside: <+/-percent>% over 3 years
**RATING: <BUY|HOLD|SELL>**

Use BUY above roughly 30% upside with favorable risk, HOLD for 10-30% or balanced risk, SELL \
below 10% or unfavorable risk.",
    },
    // -- Part 7 ------------------------------------------------------------
    SectionSpec {
        key: "section_7_1",
        part: IDENTIFICATION,
        heading: "7.1 Stewardship vs Legacy Classification",
        queries: &["{company} incremental ROIC reinvestment runway {ticker}"],
        priors: &[
            ("section_4_1", "ROIC (4.1)", 600),
            ("section_4_3", "Reinvestment (4.3)", 700),
            ("section_6_3", "Valuation (6.3)", 700),
        ],
        payloads: &[],
        window: 10,
        instructions: "Classify the company as a stewardship opportunity (long reinvestment runway at \
            high incremental returns) or a legacy one (harvesting a mature franchise), and state \
            what that means for holding period.",
    },
    // -- Part 8 ------------------------------------------------------------
    SectionSpec {
        key: "section_8_1",
        part: ENGAGEMENT,
        heading: "8.1 Culture: Values & Purpose",
        queries: &["{company} culture values purpose talent retention governance"],
        priors: &[("section_3_3", "Industry Rules (3.3)", 600)],
        payloads: &[],
        window: 15,
        instructions: "Assess whether stated values and purpose show up in behavior: talent retention, \
            incentives and how the company competes.",
    },
    SectionSpec {
        key: "section_8_2",
        part: ENGAGEMENT,
        heading: "8.2 Sustainability Assessment",
        queries: &["{company} sustainability ESG controversies targets"],
        priors: &[("section_8_1", "Culture (8.1)", 600)],
        payloads: &[],
        window: 15,
        instructions: "Identify the sustainability issues that are financially material for this \
            business, and judge the credibility of targets and the record on controversies.",
    },
    SectionSpec {
        key: "section_8_3",
        part: ENGAGEMENT,
        heading: "8.3 Addressing Risk vs Peers (Cost of Capital)",
        queries: &["{company} governance risk premium cost of capital peers"],
        priors: &[
            ("section_8_2", "Sustainability Assessment (8.2)", 700),
            ("section_5_1", "Risks (5.1)", 700),
        ],
        payloads: &[],
        window: 15,
        instructions: "Compare how the company manages its key risks with peers and what that implies \
            for its cost of capital.",
    },
    SectionSpec {
        key: "section_8_4",
        part: ENGAGEMENT,
        heading: "8.4 Engagement Opportunities & Plan",
        queries: &["{company} governance improvements engagement priorities"],
        priors: &[
            ("section_8_2", "Sustainability (8.2)", 600),
            ("section_8_3", "Risk Mitigation (8.3)", 600),
        ],
        payloads: &[],
        window: 10,
        instructions: "Propose two or three engagement priorities with management, the value each \
            could unlock and how progress would be measured.",
    },
];

impl SectionSpec {
    pub fn to_stage(&self) -> NarrativeStage {
        let mut stage = NarrativeStage::new(self.key, self.heading)
            .in_part(self.part)
            .research_window(self.window)
            .system(ANALYST_SYSTEM_PROMPT)
            .instructions(self.instructions);
        for query in self.queries {
            stage = stage.query(*query);
        }
        for (key, label, budget) in self.priors {
            stage = stage.prior(*key, *label, *budget);
        }
        for (kind, budget) in self.payloads {
            stage = stage.payload(*kind, *budget);
        }
        if self.key == VALUATION_STAGE {
            stage = stage.extracts_recommendation();
        }
        stage
    }
}

fn initialize() -> ResearchStage {
    ResearchStage::new(INITIALIZE)
        .resetting()
        .fetch(CompanyProfile)
        .query("{company} business model revenue breakdown")
        .query("{company} financial performance margins profitability")
        .query("{company} ownership structure shareholders management")
}

fn gather_financials() -> ResearchStage {
    ResearchStage::new(GATHER_FINANCIALS)
        .fetch(FinancialMetrics)
        .fetch(MarketData)
        .query("{company} DuPont analysis return on equity ROE breakdown")
        .query("{company} capital allocation working capital efficiency")
        .query("{company} margin trends profitability drivers")
}

/// Every stage of the standard report, in execution order.
pub fn standard_stages() -> Vec<Box<dyn Stage>> {
    let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(initialize()), Box::new(gather_financials())];
    stages.extend(
        SECTIONS
            .iter()
            .map(|spec| Box::new(spec.to_stage()) as Box<dyn Stage>),
    );
    stages
}

/// The standard report pipeline over `tools`.
pub fn standard_pipeline(tools: Toolkit) -> Result<Pipeline> {
    standard_stages()
        .into_iter()
        .fold(Pipeline::builder(tools), |builder, stage| builder.boxed_stage(stage))
        .build()
}
