use crate::ecobot::{self, is_image, EcoState};
use crate::gamify::{self, BadgeTier};
use crate::models::{self, Profile, UserId, WasteCategory};

use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use serenity::model::channel::Message;

const MAX_CMD_LENGTH: usize = 12;
const MAX_LEADERBOARD_SIZE: usize = 25;
const DEFAULT_HISTORY_SIZE: usize = 5;
const MAX_HISTORY_SIZE: usize = 25;
/// Most names a single list (followers, nearby) shows before summarising the rest.
const MAX_LISTED_USERS: usize = 20;
const FEED_PAGE_SIZE: usize = 5;
const MAX_LISTED_COMMENTS: usize = 10;
const POST_PREVIEW_CHARS: usize = 200;

struct CommandInstance<'a> {
    msg: &'a Message,
    ctx: &'a serenity::client::Context,
    state: &'a EcoState,

    parameters: &'a [&'a str],
}

pub struct Commands;
impl Commands {
    pub async fn run_command(
        ctx: &serenity::client::Context,
        msg: &Message,
        state: &EcoState,
    ) -> Result<String> {
        // Split the message's content (on whitespace) into:
        // - The command (first token)
        // - Its parameters (all tokens afterwards)
        let (command, parameters) = split_command(&msg.content, state.config.call_token)?;

        let cmd = CommandInstance { msg, ctx, state, parameters: &parameters };

        // Execute the command
        let result: String = match command {
              "classify" => Self::classify(ctx, msg, state).await?,
                "streak" => cmd.streak().await?,
                 "badge" => cmd.badge().await?,
           "leaderboard" => cmd.leaderboard().await?,
               "history" => cmd.history().await?,
                 "guide" => cmd.guide().await?,
               "profile" => cmd.profile().await?,
                "search" => cmd.search().await?,
                "follow" => cmd.follow().await?,
              "unfollow" => cmd.unfollow().await?,
             "followers" => cmd.followers().await?,
                "nearby" => cmd.nearby().await?,
                  "post" => cmd.post().await?,
                  "feed" => cmd.feed().await?,
                 "posts" => cmd.posts().await?,
                "delete" => cmd.delete().await?,
                  "like" => cmd.like().await?,
                "unlike" => cmd.unlike().await?,
               "comment" => cmd.comment().await?,
              "comments" => cmd.comments().await?,
             "uncomment" => cmd.uncomment().await?,
                  "help" => Self::get_help(state.config.call_token),
            _ => {
                if Commands::is_valid_cmd(command) {
                    log::info!("User submitted unknown command: {}", command);
                    return Err(anyhow!(
                        "No such command found: {}, see {}help for commands.",
                        command,
                        state.config.call_token
                    ));
                } else {
                    log::info!("User submitted invalid command: {}", command);
                    return Err(anyhow!("Invalid command syntax."));
                }
            }
        };

        Ok(result)
    }

    /// Classifies the first image attached to `msg` and counts it towards the author's streak.
    pub async fn classify(
        ctx: &serenity::client::Context,
        msg: &Message,
        state: &EcoState,
    ) -> Result<String> {
        let attachment = msg
            .attachments
            .iter()
            .find(|a| is_image(a))
            .context("Attach an image of the item you want classified.")?;

        let user_id = author_id(msg)?;
        let _typing = msg.channel_id.start_typing(&ctx.http);

        let image = attachment
            .download()
            .await
            .with_context(|| format!("Could not download {}", attachment.filename))?;

        let classification = state
            .api
            .classify_image(image, &attachment.filename, attachment.content_type.as_deref())
            .await?;

        let today = state.config.day_boundary.today();
        let author_name = msg.author.name.clone();
        let (classification, streak) = state
            .db(move |db| {
                ecobot::ensure_profile(db, &user_id, &author_name)?;
                let streak = ecobot::record_classification(db, &user_id, &classification, today)?;
                Ok((classification, streak))
            })
            .await?;

        let mut output = format!("{classification}\n");
        match classification.category {
            Some(category) => {
                output += &format!("{}\n", state.api.disposal_guide(category).await);
            }
            None => {
                output += "This doesn't match a known category, so it was logged as plastic.\n";
            }
        }
        output += &streak_line(&streak);

        Ok(output)
    }
}

impl CommandInstance<'_> {
    async fn streak(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;
        let streak = self
            .state
            .db(move |db| Ok(gamify::current_streak(db, &user_id)?))
            .await?;

        Ok(format!("{streak}\n{}", streak_line(&streak)))
    }

    async fn badge(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;
        let streak = self
            .state
            .db(move |db| Ok(gamify::current_streak(db, &user_id)?))
            .await?;

        Ok(badge_progress(streak.current_streak))
    }

    async fn leaderboard(&self) -> Result<String> {
        let limit = parse_count(self.parameters, self.state.config.leaderboard_limit, MAX_LEADERBOARD_SIZE)?;

        let entries = self.state.db(move |db| ecobot::leaderboard(db, limit)).await?;
        if entries.is_empty() {
            return Ok(String::from("Nobody is on the leaderboard yet. Classify something!"));
        }

        Ok(std::iter::once(String::from("**Leaderboard:**"))
            .chain(entries.iter().map(|e| e.to_string()))
            .join("\n"))
    }

    async fn history(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;
        let limit = parse_count(self.parameters, DEFAULT_HISTORY_SIZE, MAX_HISTORY_SIZE)?;

        let (history, counts) = self
            .state
            .db(move |db| {
                let history = db.query_classifications(&user_id, limit)?;
                let counts = db.query_category_counts(&user_id)?;
                Ok((history, counts))
            })
            .await?;

        if history.is_empty() {
            return Ok(String::from("You haven't classified anything yet."));
        }

        let counts = counts
            .into_iter()
            .map(|(category, count)| format!("{category}: {count}"))
            .join(", ");

        let mut output = String::from("**Recent classifications:**");
        for record in history {
            output += "\n\t";
            output += &record.to_string();
        }
        output += &format!("\n**Totals:** {counts}");

        Ok(output)
    }

    async fn guide(&self) -> Result<String> {
        let label = self.parameters.join(" ");
        let category = WasteCategory::from_label(&label).with_context(|| {
            format!(
                "Expected one of: {}",
                WasteCategory::ALL.iter().map(|c| c.as_str()).join(", ")
            )
        })?;

        Ok(self.state.api.disposal_guide(category).await.to_string())
    }

    async fn profile(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;

        if self.parameters.is_empty() {
            let target = match self.msg.mentions.first() {
                Some(user) => UserId::parse(&user.id.to_string())?,
                None => user_id,
            };

            let profile = self.state.db(move |db| Ok(db.query_profile(&target)?)).await?;
            return Ok(match profile {
                Some(profile) => profile.to_string(),
                None => String::from("No profile yet."),
            });
        }

        let fallback_name = self.msg.author.name.clone();
        let changes = self.parameters.iter().map(|p| p.to_string()).collect::<Vec<_>>();

        let updated = self
            .state
            .db(move |db| {
                let current = db
                    .query_profile(&user_id)?
                    .unwrap_or_else(|| Profile { username: fallback_name, ..Default::default() });

                let updated = apply_profile_changes(current, &changes)?;
                db.upsert_profile(&user_id, &updated)?;
                log::info!("Updated profile for {user_id}");

                Ok(db.query_profile(&user_id)?.unwrap_or(updated))
            })
            .await?;

        Ok(format!("Profile updated.\n{updated}"))
    }

    async fn search(&self) -> Result<String> {
        let query = self.parameters.join(" ");
        if query.trim().is_empty() {
            return Err(anyhow!("Expected usage: `{}search <username>`", self.state.config.call_token));
        }

        let pattern = query.clone();
        let found = self.state.db(move |db| Ok(db.search_profiles(&pattern)?)).await?;
        if found.is_empty() {
            return Ok(format!("No users matching '{query}'."));
        }

        Ok(found.into_iter().map(|(_, profile)| profile.username).join("\n"))
    }

    async fn follow(&self) -> Result<String> {
        let (follower, following) = self.follow_pair()?;
        if self.state.db(move |db| Ok(db.follow(&follower, &following)?)).await? {
            self.react_ok().await
        } else {
            Ok(String::from("You're already following them."))
        }
    }

    async fn unfollow(&self) -> Result<String> {
        let (follower, following) = self.follow_pair()?;
        if self.state.db(move |db| Ok(db.unfollow(&follower, &following)?)).await? {
            self.react_ok().await
        } else {
            Ok(String::from("You weren't following them."))
        }
    }

    async fn followers(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;

        let (followers, following) = self
            .state
            .db(move |db| {
                let name_of = |id: &UserId| {
                    db.resolve_name(id)
                        .unwrap_or_else(|_| String::from(gamify::PLACEHOLDER_NAME))
                };

                let followers = db.query_followers(&user_id)?;
                let following = db.query_following(&user_id)?;

                // Only the listed names are resolved; the rest are just counted.
                let names = |ids: Vec<UserId>| {
                    let total = ids.len();
                    let shown = ids.iter().take(MAX_LISTED_USERS).map(|id| name_of(id)).collect::<Vec<_>>();
                    (shown, total)
                };

                Ok((names(followers), names(following)))
            })
            .await?;

        Ok(format!(
            "**Followers ({}):** {}\n**Following ({}):** {}",
            followers.1,
            list_with_overflow(&followers.0, followers.1),
            following.1,
            list_with_overflow(&following.0, following.1),
        ))
    }

    async fn nearby(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;
        let default_radius = self.state.config.nearby_radius_km;
        let call_token = self.state.config.call_token;

        let requested = if self.parameters.is_empty() {
            None
        } else {
            Some(parse_nearby_args(self.parameters, default_radius)?)
        };

        let (radius_km, nearby) = self
            .state
            .db(move |db| {
                let (latitude, longitude, radius_km) = match requested {
                    Some(requested) => requested,
                    None => {
                        let profile = db.query_profile(&user_id)?;
                        let (lat, lon) = profile
                            .and_then(|p| p.latitude.zip(p.longitude))
                            .with_context(|| {
                                format!(
                                    "No saved location. Use `{t}nearby <lat> <lon> [radius_km]` or \
                                     `{t}profile location=<lat>,<lon>`.",
                                    t = call_token
                                )
                            })?;
                        (lat, lon, default_radius)
                    }
                };

                let nearby = db.find_nearby_users(latitude, longitude, radius_km, Some(&user_id))?;
                Ok((radius_km, nearby))
            })
            .await?;

        if nearby.is_empty() {
            return Ok(format!("Nobody within {radius_km} km. Try increasing the search radius."));
        }

        let shown = nearby.iter().take(MAX_LISTED_USERS).map(|n| n.to_string()).collect::<Vec<_>>();
        let mut output = std::iter::once(format!("**Within {radius_km} km:**"))
            .chain(shown)
            .join("\n");
        if nearby.len() > MAX_LISTED_USERS {
            output += &format!("\n...and {} more", nearby.len() - MAX_LISTED_USERS);
        }

        Ok(output)
    }

    async fn post(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;
        let (content, tags) = split_tags(self.parameters);
        if content.is_empty() {
            return Err(anyhow!(
                "Expected usage: `{}post <text> [#tag ...]` (an image attachment is optional)",
                self.state.config.call_token
            ));
        }

        let new_post = models::NewPost {
            content,
            image_url: self.msg.attachments.iter().find(|a| is_image(a)).map(|a| a.url.clone()),
            tags,
            is_public: true,
        };
        let author_name = self.msg.author.name.clone();

        let post = self
            .state
            .db(move |db| {
                ecobot::ensure_profile(db, &user_id, &author_name)?;
                Ok(db.create_post(&user_id, &new_post)?)
            })
            .await?;

        Ok(format!("Posted!\n{post}"))
    }

    async fn feed(&self) -> Result<String> {
        let page = match self.parameters.first() {
            Some(n) => n
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("Expected a page number, got '{n}'."))?,
            None => 1,
        };
        let offset = (page - 1).saturating_mul(FEED_PAGE_SIZE);

        let posts = self.state.db(move |db| Ok(db.query_feed(FEED_PAGE_SIZE, offset)?)).await?;
        if posts.is_empty() {
            return Ok(String::from("Nothing to see here yet."));
        }

        Ok(std::iter::once(format!("**Feed (page {page}):**"))
            .chain(posts.into_iter().map(|p| post_preview(p).to_string()))
            .join("\n\n"))
    }

    async fn posts(&self) -> Result<String> {
        let target = match self.msg.mentions.first() {
            Some(user) => UserId::parse(&user.id.to_string())?,
            None => author_id(self.msg)?,
        };

        let posts = self
            .state
            .db(move |db| Ok(db.query_user_posts(&target, FEED_PAGE_SIZE)?))
            .await?;
        if posts.is_empty() {
            return Ok(String::from("No posts yet."));
        }

        Ok(posts.into_iter().map(|p| post_preview(p).to_string()).join("\n\n"))
    }

    async fn delete(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;
        let post_id = parse_id(self.parameters, "post")?;

        if self.state.db(move |db| Ok(db.delete_post(post_id, &user_id)?)).await? {
            self.react_ok().await
        } else {
            Ok(format!("You have no post #{post_id}."))
        }
    }

    async fn like(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;
        let post_id = parse_id(self.parameters, "post")?;

        if self.state.db(move |db| Ok(db.like_post(post_id, &user_id)?)).await? {
            self.react_ok().await
        } else {
            Ok(String::from("You already like that post."))
        }
    }

    async fn unlike(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;
        let post_id = parse_id(self.parameters, "post")?;

        if self.state.db(move |db| Ok(db.unlike_post(post_id, &user_id)?)).await? {
            self.react_ok().await
        } else {
            Ok(String::from("You didn't like that post."))
        }
    }

    async fn comment(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;
        let post_id = parse_id(self.parameters, "post")?;
        let content = self.parameters[1..].join(" ");
        let author_name = self.msg.author.name.clone();

        let comment = self
            .state
            .db(move |db| {
                ecobot::ensure_profile(db, &user_id, &author_name)?;
                Ok(db.add_comment(post_id, &user_id, &content)?)
            })
            .await?;

        Ok(format!("Commented on post #{post_id}.\n{comment}"))
    }

    async fn comments(&self) -> Result<String> {
        let post_id = parse_id(self.parameters, "post")?;

        let (post, comments) = self
            .state
            .db(move |db| {
                let post = db.query_post(post_id)?.with_context(|| format!("No post #{post_id}."))?;
                let comments = db.query_comments(post_id, MAX_LISTED_COMMENTS)?;
                Ok((post, comments))
            })
            .await?;

        let mut output = post_preview(post).to_string();
        if comments.is_empty() {
            output += "\nNo comments yet.";
        }
        for comment in comments {
            output += "\n\t";
            output += &comment.to_string();
        }

        Ok(output)
    }

    async fn uncomment(&self) -> Result<String> {
        let user_id = author_id(self.msg)?;
        let comment_id = parse_id(self.parameters, "comment")?;

        if self.state.db(move |db| Ok(db.delete_comment(comment_id, &user_id)?)).await? {
            self.react_ok().await
        } else {
            Ok(format!("You have no comment #{comment_id}."))
        }
    }

    fn follow_pair(&self) -> Result<(UserId, UserId)> {
        let follower = author_id(self.msg)?;
        let mentioned = self
            .msg
            .mentions
            .first()
            .context("Mention the user, i.e. `follow @someone`.")?;

        Ok((follower, UserId::parse(&mentioned.id.to_string())?))
    }

    async fn react_ok(&self) -> Result<String> {
        self.msg.react(
            &self.ctx.http,
            serenity::all::ReactionType::Unicode(String::from("✅")),
        )
        .await?;

        Ok(String::from(""))
    }
}

/// Non-async helpers
impl Commands {
    /// Ensures that the string slice conforms to C-like identifier regex
    fn is_valid_cmd(s: &str) -> bool {
        s.len() <= MAX_CMD_LENGTH
            && regex::Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$")
                .is_ok_and(|re| re.is_match(s))
    }

    /// Gets a help string. Should be updated after a new command is added
    pub fn get_help(t: char) -> String {
        format!(
            r#"
**Command List:**
`{t}classify` (with an image attached):  Classify a waste item. Dropping an image in the channel works too.
`{t}streak`:  Show your current and longest streak.
`{t}badge`:  Show your badge and how far the next one is.
`{t}leaderboard [n]`:  Top users by current streak.
`{t}history [n]`:  Your recent classifications.
`{t}guide <category>`:  How to dispose of a category of waste.
`{t}profile [@user]`:  Show a profile.
`{t}profile username=<name> bio=<text> location=<lat>,<lon> avatar=<url>`:  Update your profile.
`{t}search <username>`:  Find users by name.
`{t}follow @user`, `{t}unfollow @user`, `{t}followers`:  Manage who you follow.
`{t}nearby [lat lon [radius_km]]`:  Find EcoSort users near you.
`{t}post <text> [#tag ...]`:  Share a post. Attach an image to include it.
`{t}feed [page]`, `{t}posts [@user]`:  Read posts.
`{t}like <id>`, `{t}unlike <id>`, `{t}delete <id>`:  Manage posts.
`{t}comment <id> <text>`, `{t}comments <id>`, `{t}uncomment <id>`:  Discuss a post.
`{t}help`:  Get information on supported commands
"#,
        )
    }
}

fn author_id(msg: &Message) -> Result<UserId> {
    Ok(UserId::parse(&msg.author.id.to_string())?)
}

/// Splits `$command arg arg` into the command and its arguments.
fn split_command(content: &str, call_token: char) -> Result<(&str, Vec<&str>)> {
    let input = content
        .strip_prefix(call_token)
        .context("Commands start with the call token.")?;

    let mut tokens = input.split_whitespace();
    let command = tokens.next().context("Expected a command after the call token.")?;

    Ok((command, tokens.collect()))
}

/// Reads an optional entry count from the first parameter, capped at `max`.
fn parse_count(parameters: &[&str], default: usize, max: usize) -> Result<usize> {
    let count = match parameters.first() {
        Some(n) => n
            .parse::<usize>()
            .with_context(|| format!("Expected a number of entries, got '{n}'."))?,
        None => default,
    };

    Ok(count.min(max))
}

/// Reads a post or comment id (`12` or `#12`) from the first parameter.
fn parse_id(parameters: &[&str], what: &str) -> Result<i64> {
    let raw = parameters.first().with_context(|| format!("Expected a {what} id."))?;
    raw.trim_start_matches('#')
        .parse::<i64>()
        .with_context(|| format!("Expected a {what} id, got '{raw}'."))
}

/// Separates `#tag` tokens from the rest of a post.
fn split_tags(parameters: &[&str]) -> (String, Vec<String>) {
    let (tags, words): (Vec<&str>, Vec<&str>) = parameters
        .iter()
        .copied()
        .partition(|word| word.len() > 1 && word.starts_with('#'));

    (words.join(" "), tags.into_iter().map(String::from).collect())
}

/// Joins `shown` names, noting how many of `total` were left out.
fn list_with_overflow(shown: &[String], total: usize) -> String {
    let mut list = shown.join(", ");
    if total > shown.len() {
        list += &format!(", ...and {} more", total - shown.len());
    }
    list
}

fn post_preview(mut post: models::Post) -> models::Post {
    if post.content.chars().count() > POST_PREVIEW_CHARS {
        post.content = post.content.chars().take(POST_PREVIEW_CHARS).collect::<String>() + "...";
    }
    post
}

fn streak_line(streak: &models::StreakRecord) -> String {
    format!(
        "🔥 {} day streak | {}",
        streak.current_streak,
        gamify::classify(streak.current_streak)
    )
}

fn badge_progress(current_streak: u32) -> String {
    let tier = gamify::classify(current_streak);
    let mut output = format!("**Your badge:** {tier}\n🔥 {current_streak} day streak");

    match tier.next() {
        Some(next) => {
            let remaining = next.threshold() - current_streak;
            output += &format!("\n{remaining} more day(s) to {next}");
        }
        None => {
            output += &format!("\nYou've reached the top tier. {}", BadgeTier::YearMaster.emoji());
        }
    }

    output
}

/// Applies `key=value` profile changes. A token without `=` continues the previous value,
/// so `bio=I love compost` keeps its spaces.
fn apply_profile_changes(mut profile: Profile, changes: &[impl AsRef<str>]) -> Result<Profile> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for token in changes {
        let token = token.as_ref();
        match token.split_once('=') {
            Some((key, value)) => pairs.push((key.trim().to_lowercase(), value.trim().to_string())),
            None => match pairs.last_mut() {
                Some((_, value)) => {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(token);
                }
                None => return Err(anyhow!("Expected `key=value`, got '{token}'")),
            },
        }
    }

    for (key, value) in pairs {
        match key.as_str() {
            "username" | "name" => {
                if value.is_empty() {
                    return Err(anyhow!("Username can't be empty."));
                }
                profile.username = value;
            }
            "bio" => profile.bio = value,
            "avatar" => profile.avatar_url = Some(value).filter(|v| !v.is_empty()),
            "location" => {
                let (lat, lon) = parse_lat_lon(&value)?;
                profile.latitude = Some(lat);
                profile.longitude = Some(lon);
                profile.location = format!("{lat}, {lon}");
            }
            unknown => return Err(anyhow!("Unknown profile field: {unknown}")),
        }
    }

    Ok(profile)
}

fn parse_lat_lon(value: &str) -> Result<(f64, f64)> {
    let (lat, lon) = value
        .split(',')
        .map(str::trim)
        .collect_tuple()
        .with_context(|| format!("Expected `<lat>,<lon>`, got '{value}'"))?;

    Ok((
        lat.parse().with_context(|| format!("Invalid latitude '{lat}'"))?,
        lon.parse().with_context(|| format!("Invalid longitude '{lon}'"))?,
    ))
}

fn parse_nearby_args(parameters: &[&str], default_radius: f64) -> Result<(f64, f64, f64)> {
    let usage = "Expected usage: `nearby <lat> <lon> [radius_km]`";
    let numbers = parameters
        .iter()
        .map(|p| p.trim_end_matches(',').parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .context(usage)?;

    match numbers.as_slice() {
        [lat, lon] => Ok((*lat, *lon, default_radius)),
        [lat, lon, radius] => Ok((*lat, *lon, *radius)),
        _ => Err(anyhow!(usage)),
    }
}
